#![expect(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::default_numeric_fallback,
    clippy::panic,
    reason = "test"
)]

use {
    crate::{
        init_logging,
        mock::{MockServer, StoredPayload},
        session_client, test_options,
    },
    bytes::Bytes,
    futures::future::join_all,
    hyper::Method,
    serde_json::{Value, json},
    shroud_protocol::{Envelope, SharedSecret},
    shroud_sdk::{
        Error, ErrorKind,
        client::{Client, ClientOptions, PayloadReader},
        crypto::encrypt_url,
        session::Session,
        transport::{ApiRequest, Payload},
    },
    std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    tokio::net::TcpListener,
};

struct Setup {
    server: MockServer,
    session: Arc<Session>,
    client: Client,
}

async fn setup() -> Setup {
    init_logging();
    let session = Arc::new(Session::new(SharedSecret::generate()));
    let server = MockServer::start(session.shared_secret().clone())
        .await
        .unwrap();
    let client = session_client(server.url(), Arc::clone(&session)).unwrap();
    Setup {
        server,
        session,
        client,
    }
}

fn sample_plaintext(len: u32) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn encrypted_post_and_get() {
    let Setup { server, client, .. } = setup().await;

    let response: Value = client
        .post("/api/echo", &json!({"b": 2, "a": [1]}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, json!({"echo": {"a": [1], "b": 2}}));
    let sent = &server.requests()[0];
    assert!(Envelope::from_body(&sent.body).is_some());
    assert!(!String::from_utf8_lossy(&sent.body).contains(r#""b""#));

    let response: Value = client
        .get("/api/echo?fileId=42&width=100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, json!({"query": "fileId=42&width=100"}));
    let raw_query = server.requests()[1].raw_query.clone().unwrap();
    assert!(raw_query.starts_with("ss="));
    assert!(!raw_query.contains("fileId"));

    // The IV comes from the file id, so a repeated request is byte-identical.
    let _: Option<Value> = client.get("/api/echo?fileId=42&width=100").await.unwrap();
    assert_eq!(server.requests()[2].raw_query, Some(raw_query));

    let _: Option<Value> = client.get("/api/echo?page=1").await.unwrap();
    let _: Option<Value> = client.get("/api/echo?page=1").await.unwrap();
    let requests = server.requests();
    assert_ne!(requests[3].raw_query, requests[4].raw_query);
    assert_eq!(requests[4].query.as_deref(), Some("page=1"));
}

#[tokio::test]
async fn query_less_get_is_sent_as_is() {
    let Setup { server, client, .. } = setup().await;
    let response: Value = client.get("/api/echo").await.unwrap().unwrap();
    assert_eq!(response, json!({"query": null}));
    assert_eq!(server.requests()[0].raw_query, None);
}

#[tokio::test]
async fn special_responses() {
    let Setup { server: _server, client, .. } = setup().await;

    let empty: Option<Value> = client.get("/api/empty").await.unwrap();
    assert!(empty.is_none());

    let response = client
        .send(ApiRequest::get(client.url("/api/plain").unwrap()))
        .await
        .unwrap();
    assert_eq!(
        response.payload,
        Payload::Raw(Bytes::from_static(br#"{"plain":true}"#))
    );

    let response = client
        .send(ApiRequest::get(client.url("/api/text").unwrap()))
        .await
        .unwrap();
    assert_eq!(response.payload, Payload::Text("just some text".into()));
}

#[tokio::test]
async fn stray_body_is_dropped() {
    let Setup { server, client, .. } = setup().await;
    let mut request = ApiRequest::get(client.url("/api/echo?fileId=1").unwrap());
    request.body = Some(b"do not leak".to_vec());
    client.send(request).await.unwrap();
    assert!(server.requests()[0].body.is_empty());
}

#[tokio::test]
async fn error_statuses() {
    let Setup { server: _server, client, .. } = setup().await;

    let err = client.get::<Value>("/api/fail").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Status);
    match err {
        Error::Status { status, url, .. } => {
            assert_eq!(status, 500);
            assert_eq!(url.path(), "/api/fail");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = client
        .get::<Value>("/api/missing?fileId=1")
        .await
        .unwrap_err();
    match err {
        Error::ResourceUnavailable { url } => assert_eq!(url.query(), Some("fileId=1")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn chunked_payload_reads() {
    let Setup { server, client, .. } = setup().await;
    let plaintext = sample_plaintext(1000);
    server.insert_payload("photo", StoredPayload::encrypted(&plaintext, "image/jpeg"));

    let reader = client.payload_reader(client.url("/payload/photo").unwrap());
    assert!(reader.key_header().is_none());
    let windows = [
        (0, Some(15)),
        (32, Some(47)),
        (10, Some(40)),
        (17, Some(17)),
        (990, None),
        (999, Some(999)),
        (900, Some(5000)),
        (0, None),
    ];
    for (start, end) in windows {
        let chunk = reader.read_range(start, end).await.unwrap();
        let expected_end = end.map_or(1000, |end| (end as usize + 1).min(1000));
        assert_eq!(
            chunk.bytes,
            plaintext[start as usize..expected_end],
            "window {start}-{end:?}"
        );
        assert_eq!(chunk.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(chunk.total_size, Some(1008));
        assert!(reader.key_header().is_some());
    }
    assert_eq!(server.hits(&Method::GET, "/payload/photo"), windows.len());
}

#[tokio::test]
async fn block_aligned_payload() {
    let Setup { server, client, .. } = setup().await;
    // A full padding block follows the data.
    let plaintext = sample_plaintext(992);
    server.insert_payload("aligned", StoredPayload::encrypted(&plaintext, "text/plain"));
    let url = client.url("/payload/aligned").unwrap();
    for (start, end) in [(980, Some(991)), (976, None), (0, Some(991))] {
        let chunk = client
            .fetch_payload_range(&url, start, end, None)
            .await
            .unwrap();
        assert_eq!(chunk.bytes, plaintext[start as usize..]);
    }
}

#[tokio::test]
async fn ignored_range_is_handled() {
    let Setup { server, client, .. } = setup().await;
    let plaintext = sample_plaintext(300);
    let mut payload = StoredPayload::encrypted(&plaintext, "video/mp4");
    payload.ignore_range = true;
    server.insert_payload("video", payload);

    let reader = client.payload_reader(client.url("/payload/video").unwrap());
    for (start, end) in [(32, Some(47)), (10, Some(40)), (250, None)] {
        let chunk = reader.read_range(start, end).await.unwrap();
        let expected_end = end.map_or(300, |end| end as usize + 1);
        assert_eq!(chunk.bytes, plaintext[start as usize..expected_end]);
        assert_eq!(chunk.total_size, Some(304));
    }
}

#[tokio::test]
async fn range_without_total_uses_stored_size() {
    let Setup { server, client, .. } = setup().await;
    let plaintext = sample_plaintext(100);
    let mut payload = StoredPayload::encrypted(&plaintext, "text/plain");
    payload.hide_total = true;
    server.insert_payload("tail", payload);
    let url = client.url("/payload/tail").unwrap();

    // The window ends inside the padded last block.
    let chunk = client
        .fetch_payload_range(&url, 95, Some(105), None)
        .await
        .unwrap();
    assert_eq!(chunk.bytes, plaintext[95..]);
    assert_eq!(chunk.total_size, Some(112));
    assert_eq!(server.hits(&Method::HEAD, "/payload/tail"), 1);

    let chunk = client
        .fetch_payload_range(&url, 10, Some(40), None)
        .await
        .unwrap();
    assert_eq!(chunk.bytes, plaintext[10..41]);

    // A short read needs no size lookup.
    let chunk = client.fetch_payload_range(&url, 90, None, None).await.unwrap();
    assert_eq!(chunk.bytes, plaintext[90..]);
    assert_eq!(chunk.total_size, None);
    assert_eq!(server.hits(&Method::HEAD, "/payload/tail"), 2);

    let mut payload = StoredPayload::encrypted(&plaintext, "text/plain");
    payload.hide_total = true;
    payload.refuse_head = true;
    server.insert_payload("sizeless", payload);
    let url = client.url("/payload/sizeless").unwrap();
    let err = client
        .fetch_payload_range(&url, 95, Some(105), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadUnavailable);
}

#[tokio::test]
async fn plain_payload_is_sliced() {
    let Setup { server, client, .. } = setup().await;
    let plaintext = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMN";
    server.insert_payload("notes", StoredPayload::plain(plaintext, "text/plain"));

    let url = client.url("/payload/notes").unwrap();
    let chunk = client
        .fetch_payload_range(&url, 5, Some(9), None)
        .await
        .unwrap();
    assert_eq!(chunk.bytes, "56789");
    assert_eq!(chunk.content_type.as_deref(), Some("text/plain"));
    assert!(chunk.key_header.is_none());

    let chunk = client.fetch_payload_range(&url, 40, None, None).await.unwrap();
    assert_eq!(chunk.bytes, "EFGHIJKLMN");
}

#[tokio::test]
async fn payload_failures() {
    let Setup { server, client, .. } = setup().await;
    let plaintext = sample_plaintext(100);

    let url = client.url("/payload/nothing").unwrap();
    let err = client
        .fetch_payload_range(&url, 0, Some(15), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

    let mut payload = StoredPayload::encrypted(&plaintext, "image/png");
    payload.send_key_header = false;
    server.insert_payload("keyless", payload);
    let url = client.url("/payload/keyless").unwrap();
    let err = client
        .fetch_payload_range(&url, 0, Some(15), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadUnavailable);

    let mut payload = StoredPayload::encrypted(&plaintext, "image/png");
    payload.body.truncate(101);
    server.insert_payload("truncated", payload);
    let url = client.url("/payload/truncated").unwrap();
    let err = client
        .fetch_payload_range(&url, 0, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadUnavailable);

    let err = client
        .fetch_payload_range(&url, 20, Some(10), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
}

#[tokio::test]
async fn payload_header_lookups_are_coalesced() {
    let Setup { server, client, .. } = setup().await;
    let payload = StoredPayload::encrypted(b"hello", "text/plain");
    let key_header = payload.key_header.clone();
    server.insert_payload("doc", payload);
    let url = client.url("/payload/doc").unwrap();

    let lookups = join_all((0..8).map(|_| client.payload_header(&url, true))).await;
    for info in lookups {
        let info = info.unwrap();
        assert!(info.header.encrypted);
        assert_eq!(info.header.content_type.as_deref(), Some("text/plain"));
        assert_eq!(info.key_header, key_header);
    }
    assert_eq!(server.hits(&Method::HEAD, "/payload/doc"), 1);

    // The decrypt flag is part of the key.
    let info = client.payload_header(&url, false).await.unwrap();
    assert!(info.key_header.is_none());
    assert!(info.header.key_header.is_some());
    assert_eq!(server.hits(&Method::HEAD, "/payload/doc"), 2);

    // Settled lookups are not cached.
    client.payload_header(&url, true).await.unwrap();
    assert_eq!(server.hits(&Method::HEAD, "/payload/doc"), 3);

    let missing = client.url("/payload/missing").unwrap();
    let lookups = join_all((0..3).map(|_| client.payload_header(&missing, true))).await;
    for result in lookups {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ResourceUnavailable);
    }
    assert_eq!(server.hits(&Method::HEAD, "/payload/missing"), 1);
}

#[tokio::test]
async fn without_session() {
    let Setup { server, session, .. } = setup().await;
    let plaintext = sample_plaintext(64);
    let payload = StoredPayload::encrypted(&plaintext, "image/png");
    let key_header = payload.key_header.clone().unwrap();
    server.insert_payload("img", payload);

    let client = Client::new(server.url().clone(), test_options()).unwrap();
    assert_eq!(
        client.session().unwrap_err().kind(),
        ErrorKind::MissingSharedSecret
    );
    let url = client.url("/payload/img?fileId=3").unwrap();
    assert_eq!(
        client.encrypt_url(&url).unwrap_err().kind(),
        ErrorKind::MissingSharedSecret
    );
    let err = client
        .fetch_payload_range(&url, 0, Some(15), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingSharedSecret);

    // Plain requests pass through untouched.
    let response = client
        .send(ApiRequest::get(client.url("/api/plain").unwrap()))
        .await
        .unwrap();
    assert_eq!(response.payload, Payload::Json(json!({"plain": true})));
    assert_eq!(server.requests().last().unwrap().raw_query, None);

    // A known key needs no session.
    let reader = PayloadReader::with_key_header(client.clone(), url, key_header);
    let chunk = reader.read_range(16, Some(31)).await.unwrap();
    assert_eq!(chunk.bytes, plaintext[16..32]);

    let client = client.with_session(Arc::clone(&session));
    let url = client.url("/api/echo?fileId=9").unwrap();
    assert_eq!(
        client.encrypt_url(&url).unwrap(),
        encrypt_url(&url, session.shared_secret()).unwrap()
    );
}

#[tokio::test]
async fn transport_failures_are_retried() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let accepted = Arc::clone(&accepts);
    let hang_up = tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            accepted.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let options = ClientOptions {
        retries: 3,
        ..test_options()
    };
    let session = Arc::new(Session::new(SharedSecret::generate()));
    let client = Client::new(format!("http://{addr}/").parse().unwrap(), options)
        .unwrap()
        .with_session(session);
    let err = client.get::<Value>("/api/echo").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
    hang_up.abort();
}

#[tokio::test]
async fn error_statuses_are_not_retried() {
    let Setup {
        server, session, ..
    } = setup().await;
    let options = ClientOptions {
        retries: 3,
        ..test_options()
    };
    let client = Client::new(server.url().clone(), options)
        .unwrap()
        .with_session(session);
    let err = client.get::<Value>("/api/fail").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Status);
    assert_eq!(server.hits(&Method::GET, "/api/fail"), 1);
}
