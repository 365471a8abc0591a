use {
    anyhow::{Result, anyhow},
    clap::{Parser, Subcommand},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file. Defaults to `shroud.json5` in the user config directory.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Send a GET request and print the decrypted response.
    Get {
        /// Path relative to the server URL, with an optional query.
        path: String,
    },
    /// Send a POST request with a JSON body and print the decrypted response.
    Post { path: String, body: String },
    /// Fetch and decrypt plaintext bytes `start..=end` of a stored payload.
    Range {
        path: String,
        start: u64,
        /// Last byte (inclusive). Reads until the end of the payload if omitted.
        end: Option<u64>,
        /// Write the bytes to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the headers describing a stored payload.
    PayloadHeader { path: String },
    /// Print the encrypted form of a URL.
    EncryptUrl { path: String },
    /// Print a fresh random shared secret.
    GenerateSecret,
}

#[inline]
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("cannot find config dir"))?;
    Ok(config_dir.join("shroud.json5"))
}
