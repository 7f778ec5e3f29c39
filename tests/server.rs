//! HTTP API tests against a live server bound to a free port.

mod common;

use std::sync::Arc;

use common::{harness, pdf};
use pagelens::config::Config;
use pagelens::server::{router, run_server};
use serde_json::{json, Value};
use tempfile::TempDir;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Serve a stub-backed session; returns the base URL.
async fn spawn_stub_server(max_upload_bytes: usize) -> String {
    let session = Arc::new(harness().session);
    let app = router(session, max_upload_bytes);
    let port = find_free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn upload(client: &reqwest::Client, base: &str, name: &str, body: Vec<u8>) -> Value {
    let resp = client
        .post(format!("{}/documents", base))
        .query(&[("name", name)])
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_upload_query_and_fetch_page() {
    let base = spawn_stub_server(1 << 20).await;
    let client = reqwest::Client::new();

    let body = upload(&client, &base, "report.pdf", pdf(&["intro", "net revenue 4.2M"])).await;
    assert_eq!(body["indexed"], true);
    assert_eq!(body["document"]["status"], "indexed");
    assert_eq!(body["document"]["page_count"], 2);
    assert_eq!(body["document"]["original_name"], "report.pdf");
    assert!(body.get("error").is_none());
    let id = body["document"]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "What is net revenue?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();
    assert_eq!(result["results"][0]["document_id"], id.as_str());
    assert_eq!(result["results"][0]["page_number"], 2);
    assert_eq!(result["answer"], "Found on page: net revenue 4.2M");
    let page_url = result["top_page"]["url"].as_str().unwrap().to_string();
    assert_eq!(page_url, format!("/documents/{}/pages/2", id));

    let resp = client
        .get(format!("{}{}", base, page_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"net revenue 4.2M");
}

#[tokio::test]
async fn test_failed_upload_is_reported_and_listed() {
    let base = spawn_stub_server(1 << 20).await;
    let client = reqwest::Client::new();

    let body = upload(&client, &base, "scan.pdf", b"BROKEN".to_vec()).await;
    assert_eq!(body["indexed"], false);
    assert_eq!(body["document"]["status"], "failed");
    assert_eq!(body["error"]["code"], "index_error");

    let list: Value = client
        .get(format!("{}/documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["status"], "failed");
    assert!(list[0].get("location").is_none());

    let id = body["document"]["id"].as_str().unwrap();
    let resp = client
        .post(format!("{}/documents/{}/index", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "index_error");
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let base = spawn_stub_server(1 << 20).await;
    let client = reqwest::Client::new();

    let body = upload(&client, &base, "a.pdf", pdf(&["alpha"])).await;
    let id = body["document"]["id"].as_str().unwrap();

    let resp = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{}/documents/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "not_found");

    let result: Value = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "alpha"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(result["results"].as_array().unwrap().is_empty());
    assert!(result["answer"].is_null());
    assert!(result["top_page"].is_null());
}

#[tokio::test]
async fn test_error_mapping() {
    let base = spawn_stub_server(64).await;
    let client = reqwest::Client::new();

    let body = upload(&client, &base, "p.pdf", pdf(&["one"])).await;
    let id = body["document"]["id"].as_str().unwrap();

    let resp = client
        .get(format!("{}/documents/{}/pages/5", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "stale_reference");

    let resp = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/documents", base))
        .body(Vec::new())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/documents", base))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
}

#[tokio::test]
async fn test_run_server_with_default_engines() {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let mut config = Config::default();
    config.storage.dir = tmp.path().join("uploads");
    config.server.bind = format!("127.0.0.1:{}", port);

    tokio::spawn(async move {
        run_server(&config).await.ok();
    });
    wait_for_server(port).await;
    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    // Not a PDF: indexing fails whether or not Poppler is installed.
    let body = upload(&client, &base, "notes.txt", b"plain text".to_vec()).await;
    assert_eq!(body["indexed"], false);
    assert_eq!(body["document"]["status"], "failed");
    assert_eq!(std::fs::read_dir(tmp.path().join("uploads")).unwrap().count(), 1);

    let result: Value = client
        .post(format!("{}/query", base))
        .json(&json!({"query": "anything"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(result["results"].as_array().unwrap().is_empty());
}
