//! Decryption of a byte window of a CBC-encrypted payload.
//!
//! To decrypt plaintext bytes `[chunk_start, chunk_end]`, the client fetches the
//! block-aligned ciphertext window around them. If the window does not start at the
//! beginning of the payload, it also fetches the block right before it: under CBC that
//! block is the IV of the first requested block.
//!
//! The fetched window usually ends before the real last block, which is the only one
//! with valid padding. A synthetic block is appended instead: the encryption of a full
//! padding block (sixteen `0x10` bytes) chained from the last fetched block. It decrypts to
//! a full padding block, so the decryptor accepts it and strips it.

use {
    super::cipher::{cbc_decrypt, cbc_encrypt},
    crate::{Error, Result},
    shroud_protocol::{AesKey, BLOCK_SIZE, Iv, KeyHeader},
};

const BLOCK_LEN: u64 = 16;

/// Value of each byte of a full PKCS#7 padding block.
const FULL_PADDING: u8 = 0x10;

/// A requested plaintext window and the ciphertext window that has to be fetched for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    /// First requested plaintext byte.
    pub chunk_start: u64,
    /// Last requested plaintext byte (inclusive), or `None` for "until the end".
    pub chunk_end: Option<u64>,
    /// First fetched ciphertext byte.
    pub aligned_start: u64,
    /// End of the fetched ciphertext (exclusive), or `None` for "until the end".
    pub aligned_end: Option<u64>,
}

impl ChunkWindow {
    #[inline]
    pub fn new(chunk_start: u64, chunk_end: Option<u64>) -> Result<Self> {
        let invalid = || Error::InvalidRange {
            start: chunk_start,
            end: chunk_end,
        };
        if chunk_end.is_some_and(|end| end < chunk_start) {
            return Err(invalid());
        }
        // The block before the first requested one serves as the IV. Below two blocks
        // that would be block 0, which has the file IV anyway.
        let aligned_start = match chunk_start.checked_sub(BLOCK_LEN) {
            Some(previous) => round_down(previous),
            None => 0,
        };
        let aligned_end = chunk_end
            .map(|end| round_down(end).checked_add(BLOCK_LEN).ok_or_else(invalid))
            .transpose()?;
        Ok(Self {
            chunk_start,
            chunk_end,
            aligned_start,
            aligned_end,
        })
    }

    /// Window over a response that ignored the range and returned the whole payload.
    #[must_use]
    #[inline]
    pub fn whole_payload(self) -> Self {
        Self {
            aligned_start: 0,
            aligned_end: None,
            ..self
        }
    }

    /// Whether the first fetched block is the IV of the rest rather than payload data.
    #[must_use]
    #[inline]
    pub fn borrows_iv_block(&self) -> bool {
        self.aligned_start > 0
    }

    /// Payload offset of the first decrypted byte.
    #[must_use]
    #[inline]
    pub fn plaintext_origin(&self) -> u64 {
        if self.borrows_iv_block() {
            self.aligned_start.saturating_add(BLOCK_LEN)
        } else {
            0
        }
    }

    /// Number of decrypted bytes to discard before the requested data.
    #[must_use]
    #[inline]
    pub fn start_offset(&self) -> u64 {
        self.chunk_start.saturating_sub(self.plaintext_origin())
    }

    /// Number of requested bytes, if bounded.
    #[must_use]
    #[inline]
    pub fn requested_len(&self) -> Option<u64> {
        self.chunk_end
            .map(|end| end.saturating_sub(self.chunk_start).saturating_add(1))
    }

    /// Number of ciphertext bytes the range request asks for, if bounded.
    #[must_use]
    #[inline]
    pub fn fetch_len(&self) -> Option<u64> {
        self.aligned_end
            .map(|end| end.saturating_sub(self.aligned_start))
    }

    /// Value of the `range` request header.
    #[must_use]
    #[inline]
    pub fn range_header(&self) -> String {
        match self.aligned_end {
            Some(end) => format!("bytes={}-{}", self.aligned_start, end.saturating_sub(1)),
            None => format!("bytes={}-", self.aligned_start),
        }
    }

    /// Decrypts a fetched window and returns exactly the requested plaintext.
    ///
    /// `at_end` tells whether `fetched` ends with the real last block of the payload,
    /// in which case its own padding is used.
    #[inline]
    pub fn decrypt(&self, fetched: &[u8], key_header: &KeyHeader, at_end: bool) -> Result<Vec<u8>> {
        let (iv, ciphertext) = if self.borrows_iv_block() {
            let (iv, rest) = fetched
                .split_first_chunk::<BLOCK_SIZE>()
                .ok_or(Error::InvalidCiphertextLength(fetched.len()))?;
            (Iv::new(*iv), rest)
        } else {
            (key_header.iv, fetched)
        };

        let mut plaintext = if at_end {
            cbc_decrypt(ciphertext, &iv, &key_header.aes_key)?
        } else {
            let (_, last_block) = ciphertext
                .split_last_chunk::<BLOCK_SIZE>()
                .ok_or(Error::InvalidCiphertextLength(ciphertext.len()))?;
            let synthetic = synthetic_final_block(last_block, &key_header.aes_key);
            let mut padded = Vec::with_capacity(ciphertext.len().saturating_add(BLOCK_SIZE));
            padded.extend_from_slice(ciphertext);
            padded.extend_from_slice(&synthetic);
            cbc_decrypt(&padded, &iv, &key_header.aes_key)?
        };

        let start_offset = usize::try_from(self.start_offset()).map_err(|_| self.invalid())?;
        if start_offset > plaintext.len() {
            return Err(self.invalid());
        }
        plaintext.drain(..start_offset);
        if let Some(len) = self.requested_len() {
            plaintext.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        }
        Ok(plaintext)
    }

    fn invalid(&self) -> Error {
        Error::InvalidRange {
            start: self.chunk_start,
            end: self.chunk_end,
        }
    }
}

fn round_down(offset: u64) -> u64 {
    offset.saturating_sub(offset % BLOCK_LEN)
}

fn synthetic_final_block(last_block: &[u8; BLOCK_SIZE], key: &AesKey) -> [u8; BLOCK_SIZE] {
    let encrypted = cbc_encrypt(&[FULL_PADDING; BLOCK_SIZE], &Iv::new(*last_block), key);
    // The first block of the output; the second one is the encryptor's own padding.
    encrypted
        .first_chunk::<BLOCK_SIZE>()
        .copied()
        .unwrap_or([0; BLOCK_SIZE])
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::default_numeric_fallback,
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    reason = "test"
)]
mod tests {
    use {super::*, crate::ErrorKind};

    struct Fixture {
        plaintext: Vec<u8>,
        ciphertext: Vec<u8>,
        key_header: KeyHeader,
    }

    impl Fixture {
        fn new(len: usize) -> Self {
            let plaintext: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
            let key_header = KeyHeader::generate();
            let ciphertext = cbc_encrypt(&plaintext, &key_header.iv, &key_header.aes_key);
            Self {
                plaintext,
                ciphertext,
                key_header,
            }
        }

        /// Serves the window the way an HTTP range request would.
        fn read(&self, start: u64, end: Option<u64>) -> Vec<u8> {
            let window = ChunkWindow::new(start, end).unwrap();
            let total = self.ciphertext.len();
            let from = window.aligned_start as usize;
            let to = window
                .aligned_end
                .map_or(total, |end| (end as usize).min(total));
            let at_end = to == total;
            window
                .decrypt(&self.ciphertext[from..to], &self.key_header, at_end)
                .unwrap()
        }
    }

    #[test]
    fn window_arithmetic() {
        let window = ChunkWindow::new(0, Some(15)).unwrap();
        assert_eq!((window.aligned_start, window.aligned_end), (0, Some(16)));
        assert_eq!(window.range_header(), "bytes=0-15");
        assert_eq!(window.start_offset(), 0);

        let window = ChunkWindow::new(32, Some(47)).unwrap();
        assert_eq!((window.aligned_start, window.aligned_end), (16, Some(48)));
        assert_eq!(window.range_header(), "bytes=16-47");
        assert!(window.borrows_iv_block());
        assert_eq!(window.plaintext_origin(), 32);
        assert_eq!(window.start_offset(), 0);

        let window = ChunkWindow::new(10, Some(40)).unwrap();
        assert_eq!((window.aligned_start, window.aligned_end), (0, Some(48)));
        assert_eq!(window.start_offset(), 10);
        assert_eq!(window.requested_len(), Some(31));

        let window = ChunkWindow::new(50, None).unwrap();
        assert_eq!(window.aligned_start, 32);
        assert_eq!(window.range_header(), "bytes=32-");
        assert_eq!(window.start_offset(), 2);
        assert_eq!(window.fetch_len(), None);

        let window = ChunkWindow::new(20, Some(20)).unwrap();
        assert_eq!((window.aligned_start, window.aligned_end), (0, Some(32)));

        assert_eq!(
            ChunkWindow::new(10, Some(9)).unwrap_err().kind(),
            ErrorKind::InvalidRange
        );
    }

    #[test]
    fn first_block_uses_file_iv() {
        let fixture = Fixture::new(100);
        assert_eq!(fixture.read(0, Some(15)), fixture.plaintext[0..=15]);
    }

    #[test]
    fn aligned_start_borrows_previous_block() {
        let fixture = Fixture::new(100);
        assert_eq!(fixture.read(32, Some(47)), fixture.plaintext[32..=47]);
    }

    #[test]
    fn unaligned_start_is_trimmed() {
        let fixture = Fixture::new(100);
        assert_eq!(fixture.read(10, Some(40)), fixture.plaintext[10..=40]);
    }

    #[test]
    fn open_end_reads_to_real_padding() {
        let fixture = Fixture::new(100);
        assert_eq!(fixture.read(50, None), fixture.plaintext[50..]);
        assert_eq!(fixture.read(0, None), fixture.plaintext);
    }

    #[test]
    fn end_past_payload_is_cut_at_payload_end() {
        let fixture = Fixture::new(100);
        assert_eq!(fixture.read(90, Some(200)), fixture.plaintext[90..]);
        // 96 bytes of plaintext fill six blocks; the seventh is all padding.
        let fixture = Fixture::new(96);
        assert_eq!(fixture.read(80, Some(95)), fixture.plaintext[80..]);
    }

    #[test]
    fn every_window_of_a_payload() {
        let fixture = Fixture::new(83);
        for start in 0..83 {
            for end in start..83 {
                assert_eq!(
                    fixture.read(start, Some(end)),
                    fixture.plaintext[start as usize..=end as usize],
                    "window {start}-{end}"
                );
            }
        }
    }

    #[test]
    fn synthetic_block_decrypts_to_padding() {
        let key = AesKey::generate();
        let previous = [0x5a; BLOCK_SIZE];
        let synthetic = synthetic_final_block(&previous, &key);
        let decrypted = cbc_decrypt(&synthetic, &Iv::new(previous), &key).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn truncated_fetch_is_rejected() {
        let fixture = Fixture::new(100);
        let window = ChunkWindow::new(32, Some(47)).unwrap();
        let err = window
            .decrypt(&fixture.ciphertext[16..40], &fixture.key_header, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);
        let err = window
            .decrypt(&fixture.ciphertext[16..20], &fixture.key_header, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);
    }
}
