//! End-to-end tests: real wallets, a mock registry and a mock storage node
//! on either side of a running gateway.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestHarness, TestWallet};
use postage_gate::GatewayEvent;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

const BATCH: &str = "abc123";

fn upload(
    harness: &TestHarness,
    wallet: &TestWallet,
    file_name: &str,
    batch_id: &str,
) -> RequestBuilder {
    let signature = wallet.sign(&format!("{file_name}:{batch_id}"));
    upload_as(harness, &signature, &wallet.address(), file_name, batch_id)
}

fn upload_as(
    harness: &TestHarness,
    signature: &str,
    uploader: &str,
    file_name: &str,
    batch_id: &str,
) -> RequestBuilder {
    harness
        .client
        .post(harness.url("/bzz"))
        .header("x-upload-signed-message", signature)
        .header("x-uploader-address", uploader)
        .header("x-file-name", file_name)
        .header("swarm-postage-batch-id", batch_id)
}

async fn json(response: Response) -> Value {
    response.json().await.expect("json body")
}

fn session_token(response: &Response) -> String {
    response.headers()["x-session-token"]
        .to_str()
        .expect("ascii token")
        .to_string()
}

#[tokio::test]
async fn test_valid_upload_is_forwarded_unchanged() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let payload = vec![7u8; 256 * 1024];
    let response = upload(&harness, &wallet, "report1.pdf", BATCH)
        .header("content-type", "application/octet-stream")
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().get("x-session-token").is_none());
    assert_eq!(json(response).await["reference"], "f00dbabe");

    let requests = harness.upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, reqwest::Method::POST);
    assert_eq!(requests[0].path, "/bzz");
    assert_eq!(requests[0].body.as_ref(), payload.as_slice());
    assert_eq!(requests[0].headers["swarm-postage-batch-id"], BATCH);
    assert_eq!(requests[0].headers["content-type"], "application/octet-stream");
    assert_eq!(harness.registry.calls(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_query_string_survives_forwarding() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let response = harness
        .client
        .post(harness.url("/bzz?name=report1.pdf"))
        .header("x-upload-signed-message", wallet.sign("report1.pdf:abc123"))
        .header("x-uploader-address", wallet.address())
        .header("x-file-name", "report1.pdf")
        .header("swarm-postage-batch-id", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(harness.upstream.requests()[0].path, "/bzz?name=report1.pdf");

    harness.teardown().await;
}

#[tokio::test]
async fn test_uppercase_address_matches_lowercase_payer() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(2);
    harness.registry.set_payer(BATCH, &wallet.address());

    let signature = wallet.sign("report1.pdf:abc123");
    let response = upload_as(&harness, &signature, &wallet.address_upper(), "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(harness.upstream.requests().len(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_custom_message_content_is_what_gets_signed() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());
    let message = "I upload report1.pdf to abc123";

    let signature = wallet.sign(message);
    let response = upload_as(&harness, &signature, &wallet.address(), "report1.pdf", BATCH)
        .header("x-message-content", message)
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // The default "{file}:{batch}" signature no longer matches.
    let response = upload(&harness, &wallet, "report1.pdf", BATCH)
        .header("x-message-content", message)
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    harness.teardown().await;
}

#[tokio::test]
async fn test_tampered_signature_is_rejected_before_upstream() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    // Signed for a different file name.
    let signature = wallet.sign("other.pdf:abc123");
    let response = upload_as(&harness, &signature, &wallet.address(), "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json(response).await;
    assert_eq!(body["error"], "Invalid signature");
    assert_eq!(body["provided"], wallet.address());
    assert!(harness.upstream.requests().is_empty());
    assert_eq!(harness.registry.calls(), 0);

    harness.teardown().await;
}

#[tokio::test]
async fn test_signature_from_other_wallet_is_rejected() {
    let harness = TestHarness::setup().await;
    let owner = TestWallet::from_seed(1);
    let impostor = TestWallet::from_seed(2);
    harness.registry.set_payer(BATCH, &owner.address());

    let signature = impostor.sign("report1.pdf:abc123");
    let response = upload_as(&harness, &signature, &owner.address(), "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json(response).await;
    assert_eq!(body["provided"], owner.address());
    assert_eq!(body["recovered"], impostor.address());
    assert!(harness.upstream.requests().is_empty());

    harness.teardown().await;
}

#[tokio::test]
async fn test_malformed_signature_is_rejected() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);

    let response = upload_as(&harness, "0xnothex", &wallet.address(), "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.upstream.requests().is_empty());

    harness.teardown().await;
}

#[tokio::test]
async fn test_non_payer_is_forbidden() {
    let harness = TestHarness::setup().await;
    let payer = TestWallet::from_seed(1);
    let uploader = TestWallet::from_seed(2);
    harness.registry.set_payer(BATCH, &payer.address());

    let response = upload(&harness, &uploader, "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json(response).await;
    assert_eq!(body["error"], "Not authorized for this batch");
    assert_eq!(body["batchPayer"], payer.address());
    assert_eq!(body["uploader"], uploader.address());
    assert!(harness.upstream.requests().is_empty());

    harness.teardown().await;
}

#[tokio::test]
async fn test_unknown_batch_is_forbidden() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);

    let response = upload(&harness, &wallet, "report1.pdf", "0xdead")
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json(response).await;
    assert_eq!(body["error"], "Batch not found");
    assert_eq!(body["batchId"], "0xdead");

    harness.teardown().await;
}

#[tokio::test]
async fn test_each_missing_header_is_flagged() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    let signature = wallet.sign("report1.pdf:abc123");
    let address = wallet.address();
    let all = [
        ("x-upload-signed-message", signature.as_str()),
        ("x-uploader-address", address.as_str()),
        ("x-file-name", "report1.pdf"),
        ("swarm-postage-batch-id", BATCH),
    ];

    for (omitted, _) in &all {
        let mut request = harness.client.post(harness.url("/bzz")).body("data");
        for (name, value) in all.iter().filter(|(name, _)| name != omitted) {
            request = request.header(*name, *value);
        }

        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "omitting {omitted}");
        let body = json(response).await;
        assert_eq!(body["error"], "Missing required headers");
        for (name, _) in &all {
            assert_eq!(body["missing"][name], name == omitted, "flag for {name}");
        }
    }

    assert!(harness.upstream.requests().is_empty());
    harness.teardown().await;
}

#[tokio::test]
async fn test_multi_file_session_round_trip() {
    let mut harness = TestHarness::setup().await;
    let mut events = harness.events().unwrap();
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let first = upload(&harness, &wallet, "report1.pdf", BATCH)
        .header("x-multi-file-upload", "true")
        .body("first")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(first.headers()["x-session-created"], "true");
    let token = session_token(&first);
    assert_eq!(token.len(), 64);
    assert_eq!(harness.registry.calls(), 1);

    // Second file: no signature at all, only the session binding.
    let second = harness
        .client
        .post(harness.url("/bzz"))
        .header("x-upload-session-token", &token)
        .header("x-uploader-address", wallet.address_upper())
        .header("x-file-name", "report2.pdf")
        .header("swarm-postage-batch-id", BATCH)
        .body("second")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers()["x-session-valid"], "true");
    assert_eq!(session_token(&second), token);
    assert_eq!(harness.registry.calls(), 1);

    let session = harness.sessions().get(&token).unwrap();
    assert_eq!(session.file_count, 2);
    assert_eq!(session.uploader_address, wallet.address());
    assert_eq!(harness.upstream.requests().len(), 2);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&GatewayEvent::SessionCreated {
        uploader: wallet.address(),
        batch_id: BATCH.to_string(),
    }));
    assert!(seen.contains(&GatewayEvent::SessionReused {
        uploader: wallet.address(),
        file_count: 2,
    }));

    harness.teardown().await;
}

#[tokio::test]
async fn test_session_bound_to_other_batch_falls_back() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let first = upload(&harness, &wallet, "report1.pdf", BATCH)
        .header("x-multi-file-upload", "true")
        .body("first")
        .send()
        .await
        .unwrap();
    let token = session_token(&first);

    // Same token presented for a different batch without a signature.
    let response = harness
        .client
        .post(harness.url("/bzz"))
        .header("x-upload-session-token", &token)
        .header("x-uploader-address", wallet.address())
        .header("swarm-postage-batch-id", "def456")
        .body("second")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["missing"]["x-upload-signed-message"], true);

    // The session itself was not consumed by the mismatch.
    assert_eq!(harness.sessions().get(&token).unwrap().file_count, 1);
    assert_eq!(harness.upstream.requests().len(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_expired_session_requires_full_verification() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let first = upload(&harness, &wallet, "report1.pdf", BATCH)
        .header("x-multi-file-upload", "true")
        .body("first")
        .send()
        .await
        .unwrap();
    let token = session_token(&first);
    assert_eq!(harness.registry.calls(), 1);

    harness.clock.advance(chrono::Duration::minutes(16));

    // A token-only request is now treated as unauthenticated.
    let token_only = harness
        .client
        .post(harness.url("/bzz"))
        .header("x-upload-session-token", &token)
        .header("x-uploader-address", wallet.address())
        .header("swarm-postage-batch-id", BATCH)
        .body("second")
        .send()
        .await
        .unwrap();
    assert_eq!(token_only.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.sessions().get(&token).is_none());

    // With full credentials the upload goes through the registry again.
    let verified = upload(&harness, &wallet, "report2.pdf", BATCH)
        .header("x-upload-session-token", &token)
        .body("second")
        .send()
        .await
        .unwrap();
    assert_eq!(verified.status(), StatusCode::CREATED);
    assert!(verified.headers().get("x-session-valid").is_none());
    assert_eq!(harness.registry.calls(), 2);

    harness.teardown().await;
}

#[tokio::test]
async fn test_sweep_purges_only_expired_sessions() {
    let harness = TestHarness::setup().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    for file in ["a.pdf", "b.pdf"] {
        let response = upload(&harness, &wallet, file, BATCH)
            .header("x-multi-file-upload", "true")
            .body("data")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert_eq!(harness.sessions().len(), 2);

    harness.clock.advance(chrono::Duration::minutes(10));
    let fresh = upload(&harness, &wallet, "c.pdf", BATCH)
        .header("x-multi-file-upload", "true")
        .body("data")
        .send()
        .await
        .unwrap();
    let fresh_token = session_token(&fresh);

    harness.clock.advance(chrono::Duration::minutes(6));
    assert_eq!(harness.sessions().sweep(), 2);
    assert_eq!(harness.sessions().len(), 1);
    assert!(harness.sessions().get(&fresh_token).is_some());

    harness.teardown().await;
}

#[tokio::test]
async fn test_get_bypasses_verification() {
    let harness = TestHarness::setup().await;

    let response = harness
        .client
        .get(harness.url("/bzz/f00dbabe"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "chunk-data");
    let requests = harness.upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, reqwest::Method::GET);
    assert_eq!(requests[0].path, "/bzz/f00dbabe");
    assert_eq!(harness.registry.calls(), 0);

    harness.teardown().await;
}

#[tokio::test]
async fn test_registry_outage_is_server_error() {
    let mut harness = TestHarness::setup_with_registry_down().await;
    let mut events = harness.events().unwrap();
    let wallet = TestWallet::from_seed(1);

    let response = upload(&harness, &wallet, "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(response).await;
    assert_eq!(body["error"], "Failed to verify batch ownership");
    assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
    assert!(harness.upstream.requests().is_empty());

    let mut rejected = false;
    while let Ok(event) = events.try_recv() {
        rejected |= matches!(event, GatewayEvent::UploadRejected { status: 500, .. });
    }
    assert!(rejected);

    harness.teardown().await;
}

#[tokio::test]
async fn test_upstream_outage_is_plain_text_error() {
    let harness = TestHarness::setup_with_upstream_down().await;
    let wallet = TestWallet::from_seed(1);
    harness.registry.set_payer(BATCH, &wallet.address());

    let response = upload(&harness, &wallet, "report1.pdf", BATCH)
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().starts_with("Proxy error"));

    let response = harness
        .client
        .get(harness.url("/bzz/f00dbabe"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    harness.teardown().await;
}

/// Read an HTTP message head byte by byte, leaving any tunnelled bytes unread.
async fn read_head(stream: &mut tokio::net::TcpStream) -> String {
    use tokio::io::AsyncReadExt;

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = stream.read_u8().await.expect("head byte");
        head.push(byte);
    }
    String::from_utf8(head).expect("utf-8 head").to_ascii_lowercase()
}

#[tokio::test]
async fn test_websocket_upgrade_is_tunnelled() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    // Storage node that accepts the upgrade and then echoes raw bytes.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let node_addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = head_tx.send(read_head(&mut socket).await);
        socket
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Connection: Upgrade\r\n\
                  Upgrade: websocket\r\n\
                  Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
            )
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let harness = TestHarness::setup_with_upstream(format!("http://{node_addr}")).await;

    let mut client = TcpStream::connect(harness.addr()).await.unwrap();
    client
        .write_all(
            b"GET /pss/subscribe/topic HTTP/1.1\r\n\
              Host: gateway\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let response = read_head(&mut client).await;
    assert!(response.starts_with("http/1.1 101"), "{response}");
    assert!(response.contains("upgrade: websocket"), "{response}");
    assert!(response.contains("connection: upgrade"), "{response}");
    assert!(response.contains("sec-websocket-accept: s3pplmbitxaq9kygzzhzrbk+xoo="));

    let request = head_rx.await.unwrap();
    assert!(request.starts_with("get /pss/subscribe/topic http/1.1"), "{request}");
    assert!(request.contains("upgrade: websocket"), "{request}");
    assert!(request.contains("connection: upgrade"), "{request}");
    assert!(request.contains("sec-websocket-key: dghlihnhbxbszsbub25jzq=="), "{request}");

    // Frames flow through untouched in both directions.
    let frame = b"\x81\x04ping";
    client.write_all(frame).await.unwrap();
    let mut echoed = [0u8; 6];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, frame);

    drop(client);
    harness.teardown().await;
}
