mod common;

use fetcher_http::{BufferPool, Context, Fetcher, HttpError, Request, RequestOptions};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

fn item() -> Item {
    Item {
        id: 7,
        name: "widget".to_string(),
    }
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item()))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client();
    let response = client
        .get(
            &Context::new(),
            &format!("{}/flaky", server.uri()),
            RequestOptions::new().max_attempts(3),
        )
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.attempts(), 3);
    assert_eq!(response.json::<Item>().await.unwrap(), item());
}

#[tokio::test]
async fn test_exhausted_retries_return_final_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("still down"))
        .expect(2)
        .mount(&server)
        .await;

    let client = common::client();
    let response = client
        .get(
            &Context::new(),
            &format!("{}/down", server.uri()),
            RequestOptions::new().max_attempts(2),
        )
        .await
        .expect("a final 5xx is not an error");

    assert_eq!(response.status(), 500);
    assert_eq!(response.attempts(), 2);
    assert_eq!(response.text().await.unwrap(), "still down");
}

#[tokio::test]
async fn test_json_body_and_headers_on_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(item()))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_json(item()))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let pool = BufferPool::new(2);
    let client = common::client();
    let options = RequestOptions::new()
        .bearer_auth("secret")
        .header("x-request-id", "abc-123")
        .json_in(&pool, &item())
        .max_attempts(2);

    let response = client
        .post(&Context::new(), &format!("{}/items", server.uri()), options)
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(pool.checkouts(), 1);
    assert_eq!(pool.checkins(), 1);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    for request in &received {
        let id = request.headers.get("x-request-id").unwrap();
        assert_eq!(id.to_str().unwrap(), "abc-123");
        let body: Item = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body, item());
    }
}

#[tokio::test]
async fn test_method_helpers() {
    let server = MockServer::start().await;
    for verb in ["HEAD", "PUT", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/items/7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = common::client();
    let ctx = Context::new();
    let url = format!("{}/items/7", server.uri());

    assert_eq!(client.head(&ctx, &url, RequestOptions::new()).await.unwrap().status(), 204);
    assert_eq!(client.put(&ctx, &url, RequestOptions::new().body("name=widget")).await.unwrap().status(), 204);
    assert_eq!(client.patch(&ctx, &url, RequestOptions::new()).await.unwrap().status(), 204);
    assert_eq!(client.delete(&ctx, &url, RequestOptions::new()).await.unwrap().status(), 204);
}

#[tokio::test]
async fn test_hook_reads_final_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tagged"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-version", "42"))
        .mount(&server)
        .await;

    let version = Arc::new(AtomicU16::new(0));
    let seen = version.clone();
    let options = RequestOptions::new().after_do(move |request, response| {
        assert_eq!(request.method(), Method::GET);
        let value = response
            .headers()
            .get("x-version")
            .ok_or("missing x-version")?
            .to_str()?
            .parse::<u16>()?;
        seen.store(value, Ordering::SeqCst);
        Ok(())
    });

    let client = common::client();
    let request = Request::build(Method::GET, &format!("{}/tagged", server.uri()), options).unwrap();
    client.execute(&Context::new(), request).await.unwrap();

    assert_eq!(version.load(Ordering::SeqCst), 42);
}

#[tokio::test]
async fn test_server_error_check_surfaces_to_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = common::client();
    let response = client
        .get(&Context::new(), &server.uri(), RequestOptions::new())
        .await
        .unwrap();

    let err = response.check().await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and release a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/gone", listener.local_addr().unwrap());
    drop(listener);

    let client = common::client();
    let err = client
        .get(&Context::new(), &url, RequestOptions::new().max_attempts(3))
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Transport(_)));
}
