//! Scenarios against the process-wide shared context.
//!
//! Everything lives in one test because the shared context is global state;
//! parallel tests mutating it would race.

mod support;
use support::socket_guard::start_mock_server_or_skip;

use std::sync::{Arc, Mutex};

use fuel::{ErrorKind, Method, Request, RequestConvertible};
use tempfile::TempDir;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

struct Ping(url::Url);

impl RequestConvertible for Ping {
    fn request(&self) -> Request {
        Request::new(Method::Head, self.0.clone())
    }
}

#[tokio::test]
async fn test_shared_context_end_to_end() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/get"))
        .and(header("foo", "bar"))
        .and(query_param("key", "value"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_string("key=value&name=fuel"))
        .respond_with(ResponseTemplate::new(200).set_body_string("posted"))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bytes/4096"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9_u8; 4096]))
        .mount(&mock_server)
        .await;

    // Nothing configured yet: relative targets cannot resolve.
    let early = fuel::get("/get").response_bytes().await;
    assert_eq!(early.result.unwrap_err().kind(), ErrorKind::InvalidUrl);

    let shared = fuel::shared();
    shared.set_base_path(mock_server.uri());
    shared.set_additional_headers([("foo", "bar")]);
    shared.set_additional_params([("key", "value")]);

    let got = fuel::get("/get").response_string().await;
    assert_eq!(got.result.unwrap(), "{\"ok\":true}");
    assert_eq!(got.response.unwrap().status_code(), 200);

    let typed = fuel::get("/get").response_json::<serde_json::Value>().await;
    assert_eq!(typed.result.unwrap()["ok"], true);

    let posted = fuel::post("/post")
        .parameter("name", "fuel")
        .response_string()
        .await;
    assert_eq!(posted.result.unwrap(), "posted");

    let ping = Ping(url::Url::parse(&format!("{}/ping", mock_server.uri())).unwrap());
    let pinged = fuel::request(&ping).response_bytes().await;
    assert_eq!(pinged.request.unwrap().method(), Method::Head);
    assert!(pinged.result.unwrap().is_empty());

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("shared.bin");
    let destination = target.clone();
    let last = Arc::new(Mutex::new((0_u64, 0_i64)));
    let sink = Arc::clone(&last);
    let downloaded = fuel::download("/bytes/4096")
        .destination(move |_, _| Ok(destination.clone()))
        .progress(move |read, total| *sink.lock().unwrap() = (read, total))
        .send()
        .await;
    assert_eq!(downloaded.result.unwrap().bytes_read, 4096);
    assert_eq!(*last.lock().unwrap(), (4096, 4096));
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 4096);

    // A builder keeps the snapshot taken when it was created.
    let pending = fuel::get("/get");
    shared.clear_base_path();
    let still_resolves = pending.response_bytes().await;
    assert!(still_resolves.is_success());
    let now_invalid = fuel::get("/get").response_bytes().await;
    assert_eq!(now_invalid.result.unwrap_err().kind(), ErrorKind::InvalidUrl);
}
