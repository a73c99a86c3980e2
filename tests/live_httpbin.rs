//! Scenarios against the public httpbin service.
//!
//! Ignored by default; run with `cargo test -- --ignored` when network
//! access is available.

use fuel::{ClientContext, ErrorKind};
use tempfile::TempDir;

fn httpbin() -> ClientContext {
    let context = ClientContext::new();
    context.set_base_path("https://httpbin.org");
    context
}

#[tokio::test]
#[ignore = "requires network access to httpbin.org"]
async fn test_live_get_echoes_merged_headers_and_params() {
    let context = httpbin();
    context.set_additional_headers([("foo", "bar")]);
    context.set_additional_params([("key", "value")]);

    let completion = context.get("/get").response_string().await;
    let body: serde_json::Value = serde_json::from_str(&completion.result.unwrap()).unwrap();
    assert_eq!(body["headers"]["Foo"], "bar");
    assert_eq!(body["args"]["key"], "value");
}

#[tokio::test]
#[ignore = "requires network access to httpbin.org"]
async fn test_live_absolute_https_target_ignores_base() {
    let completion = ClientContext::new()
        .get("https://httpbin.org/get")
        .response_bytes()
        .await;
    assert_eq!(completion.response.unwrap().status_code(), 200);
}

#[tokio::test]
#[ignore = "requires network access to httpbin.org"]
async fn test_live_status_404_is_failure() {
    let completion = httpbin().get("/status/404").response_bytes().await;
    assert_eq!(completion.result.unwrap_err().kind(), ErrorKind::HttpStatus);
}

#[tokio::test]
#[ignore = "requires network access to httpbin.org"]
async fn test_live_download_one_mebibyte() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("bytes.bin");
    let destination = target.clone();

    let completion = httpbin()
        .download("/bytes/1048576")
        .destination(move |_, _| Ok(destination.clone()))
        .send()
        .await;

    assert_eq!(completion.response.unwrap().status_code(), 200);
    let download = completion.result.unwrap();
    assert_eq!(download.bytes_read, 1_048_576);
    assert_eq!(download.total_bytes, 1_048_576);
}
