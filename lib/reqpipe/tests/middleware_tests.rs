//! Integration tests for the executor middleware using wiremock.

use std::time::Duration;

use assert2::{check, let_assert};
use bytes::Bytes;
use reqpipe::middleware::{CachePolicy, Credential};
use reqpipe::tower::ServiceExt;
use reqpipe::{
    Error, ExecutorConfig, Handler, HttpClientExt, Method, Middleware, Request, RequestExecutor,
    handler_fn,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn url(server: &MockServer, path: &str) -> url::Url {
    url::Url::parse(&format!("{}{path}", server.uri())).expect("url")
}

fn get(server: &MockServer, path: &str) -> Request<Bytes> {
    Request::builder(Method::GET, url(server, path)).build()
}

/// Executor with short retry waits so tests stay fast.
fn quick_executor() -> RequestExecutor {
    RequestExecutor::with_config(
        ExecutorConfig::builder()
            .min_retry_wait(Duration::from_millis(10))
            .max_retry_wait(Duration::from_millis(50))
            .build(),
    )
}

// Authorization

#[tokio::test]
async fn test_authorization_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/protected"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new().with_authorization("Bearer", || async {
        Ok(Credential::new("abc123", Duration::from_secs(3600)))
    });

    for _ in 0..2 {
        let text = executor
            .fetch_text(get(&mock_server, "/protected"))
            .await
            .expect("text");
        check!(text == "welcome");
    }
}

#[tokio::test]
async fn test_authorization_failure_sends_unauthenticated_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/protected"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new().with_authorization("Bearer", || async {
        Err(Error::authorization("identity provider unavailable"))
    });

    let response = executor
        .execute(get(&mock_server, "/protected"))
        .await
        .expect("response");
    check!(response.status() == 401);

    let_assert!(Some(received) = mock_server.received_requests().await);
    let_assert!([request] = received.as_slice());
    check!(request.headers.get("authorization").is_none());
}

// Retry

#[tokio::test]
async fn test_retry_exhausted_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/unavailable"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let executor = quick_executor().with_exponential_retry(2);

    let_assert!(
        Err(Error::RetriesExhausted {
            attempts, source, ..
        }) = executor.execute(get(&mock_server, "/unavailable")).await
    );
    check!(attempts == 3);
    check!(source.status() == Some(503));
}

#[tokio::test]
async fn test_retry_skips_terminal_statuses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/not-implemented"))
        .respond_with(ResponseTemplate::new(501))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = quick_executor().with_exponential_retry(3);

    let response = executor
        .execute(get(&mock_server, "/missing"))
        .await
        .expect("response");
    check!(response.status() == 404);

    let response = executor
        .execute(get(&mock_server, "/not-implemented"))
        .await
        .expect("response");
    check!(response.status() == 501);
}

#[tokio::test]
async fn test_retry_recovers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = quick_executor().with_linear_retry(3);

    let text = executor
        .fetch_text(get(&mock_server, "/flaky"))
        .await
        .expect("text");
    check!(text == "recovered");
}

#[tokio::test]
async fn test_retry_on_too_many_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = quick_executor().with_exponential_retry(1);

    let response = executor
        .execute(get(&mock_server, "/limited"))
        .await
        .expect("response");
    check!(response.status() == 200);
}

#[tokio::test]
async fn test_redirect_loop_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::with_config(
        ExecutorConfig::builder()
            .max_redirects(3)
            .min_retry_wait(Duration::from_millis(10))
            .max_retry_wait(Duration::from_millis(50))
            .build(),
    )
    .with_exponential_retry(3);

    let_assert!(
        Err(Error::TooManyRedirects { count, max }) =
            executor.execute(get(&mock_server, "/loop")).await
    );
    check!(count == 3);
    check!(max == 3);
}

#[tokio::test]
async fn test_retry_registered_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/unavailable"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = quick_executor()
        .with_exponential_retry(1)
        .with_linear_retry(5);
    check!(executor.middleware_count() == 1);

    let_assert!(
        Err(Error::RetriesExhausted { attempts, .. }) =
            executor.execute(get(&mock_server, "/unavailable")).await
    );
    check!(attempts == 2);
}

// Cache

#[tokio::test]
async fn test_cache_serves_repeated_get() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("id", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "name": "mock"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new().with_caching(Duration::from_secs(60));

    let first: serde_json::Value = executor
        .get_json(url(&mock_server, "/items?id=1").as_str())
        .await
        .expect("first");
    let second: serde_json::Value = executor
        .get_json(url(&mock_server, "/items?ID=1").as_str())
        .await
        .expect("second");

    check!(first == second);
}

#[tokio::test]
async fn test_cache_ignores_post() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new().with_caching(Duration::from_secs(60));

    for _ in 0..2 {
        let created: serde_json::Value = executor
            .post_json(
                url(&mock_server, "/items").as_str(),
                &serde_json::json!({"name": "new"}),
            )
            .await
            .expect("created");
        check!(created["id"] == 7);
    }
}

#[tokio::test]
async fn test_cache_failures_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new()
        .with_caching_policy(Duration::from_secs(60), CachePolicy::Failures);

    for _ in 0..2 {
        let response = executor
            .execute(get(&mock_server, "/broken"))
            .await
            .expect("response");
        check!(response.status() == 500);

        let response = executor
            .execute(get(&mock_server, "/fine"))
            .await
            .expect("response");
        check!(response.status() == 200);
    }
}

// Observability

#[tokio::test]
async fn test_logging_and_performance_monitor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("done")
                .set_delay(Duration::from_millis(20)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new()
        .with_debug_logging()
        .with_performance_monitor(Duration::from_millis(1));

    let text = executor
        .fetch_text(get(&mock_server, "/slow"))
        .await
        .expect("text");
    check!(text == "done");
}

// Custom middleware

fn tag(label: &'static str) -> Middleware {
    Middleware::from_fn(move |next: Handler| {
        handler_fn(move |mut request: Request<Bytes>| {
            let trace = match request.header("x-trace") {
                Some(previous) => format!("{previous}>{label}"),
                None => label.to_string(),
            };
            request.set_header("x-trace", trace);
            next.clone().oneshot(request)
        })
    })
}

#[tokio::test]
async fn test_custom_middleware_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trace"))
        .and(header("x-trace", "outer>inner"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = RequestExecutor::new()
        .with_middleware(tag("outer"))
        .with_middleware(tag("inner"));

    let response = executor
        .execute(get(&mock_server, "/trace"))
        .await
        .expect("response");
    check!(response.status() == 204);
}
