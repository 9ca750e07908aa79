//! End-to-end calls through `ApiClient` against a local mock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use http::StatusCode;
use httpmock::prelude::*;
use modkit_rest_client::{
    ApiClient, ApiClientConfig, ApiDefinition, ApiError, ApiKeyLocation, AuthScheme, CallArgs,
    EndpointDescriptor, EndpointSpec, ErrorCategory, Interceptor, LoggingInterceptor,
    ProcessingKind, StatusKind, TransportConfig, WireRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    name: String,
    at: DateTime<Utc>,
}

fn testing_config() -> ApiClientConfig {
    ApiClientConfig {
        transport: TransportConfig::for_testing(),
        ..ApiClientConfig::default()
    }
}

fn user_api(server: &MockServer) -> ApiDefinition {
    ApiDefinition::new("UserApi")
        .base_url(server.base_url())
        .endpoint(EndpointSpec::get("get_user", "/users/{id}").path_param("id"))
        .endpoint(EndpointSpec::delete("delete_user", "/users/{id}").path_param("id"))
        .endpoint(
            EndpointSpec::get("search", "/users")
                .header("Accept", "application/json")
                .query_param("q")
                .query_param("page")
                .header_map(),
        )
        .endpoint(EndpointSpec::get("health", "/health").returns_text())
        .endpoint(EndpointSpec::post("record_event", "/events").body())
}

fn client(server: &MockServer) -> ApiClient {
    ApiClient::builder(user_api(server))
        .config(testing_config())
        .interceptor(LoggingInterceptor)
        .build()
        .unwrap()
}

#[tokio::test]
async fn get_decodes_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/users/42");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"name":"Ann","role":"admin"}"#);
    });

    let user: Option<User> = client(&server)
        .call("get_user", CallArgs::new().arg(&42))
        .await
        .unwrap();

    assert_eq!(user, Some(User { name: "Ann".into() }));
    mock.assert_calls(1);
}

#[tokio::test]
async fn no_content_yields_none() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(DELETE).path("/users/7");
        then.status(204);
    });

    let result: Option<User> = client(&server)
        .call("delete_user", CallArgs::new().arg(&7))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn not_found_is_a_typed_status_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users/404");
        then.status(404)
            .header("content-type", "application/json")
            .body(r#"{"code":"NOT_FOUND","message":"no such user"}"#);
    });

    let err = client(&server)
        .call::<User>("get_user", CallArgs::new().arg(&404))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Status);
    assert_eq!(err.status_kind(), Some(StatusKind::NotFound));
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.error_code(), Some("NOT_FOUND"));
    assert_eq!(err.to_string(), "API request failed with status 404: Not Found");
}

#[tokio::test]
async fn server_errors_fall_back_by_status_class() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users/1");
        then.status(502).body("upstream down");
    });

    let err = client(&server)
        .call::<User>("get_user", CallArgs::new().arg(&1))
        .await
        .unwrap_err();
    assert_eq!(err.status_kind(), Some(StatusKind::ServerError));
    assert_eq!(err.error_code(), Some("UNKNOWN_ERROR"));
    assert_eq!(err.body(), Some("upstream down"));
}

#[tokio::test]
async fn text_endpoint_returns_raw_text() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200)
            .header("content-type", "text/plain")
            .body(r#"{"looks":"like json"}"#);
    });

    let text: Option<String> = client(&server)
        .call("health", CallArgs::new())
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some(r#"{"looks":"like json"}"#));
}

#[tokio::test]
async fn html_on_json_endpoint_is_rejected_without_parsing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users/1");
        then.status(200)
            .header("content-type", "text/html")
            .body("<html>login</html>");
    });

    let err = client(&server)
        .call::<User>("get_user", CallArgs::new().arg(&1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Processing {
            kind: ProcessingKind::InvalidContentType,
            ..
        }
    ));
    assert_eq!(err.body(), Some("<html>login</html>"));
}

#[tokio::test]
async fn body_round_trips_dates_as_iso_8601() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/events")
            .header("content-type", "application/json")
            .json_body(json!({"name": "deploy", "at": "2024-05-01T12:00:00Z"}));
        then.status(201)
            .header("content-type", "application/json")
            .body(r#"{"name":"deploy","at":"2024-05-01T12:00:00Z","id":9}"#);
    });

    let event = Event {
        name: "deploy".into(),
        at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    };
    let created: Option<Event> = client(&server)
        .call("record_event", CallArgs::new().arg(&event))
        .await
        .unwrap();

    assert_eq!(created, Some(event));
    mock.assert();
}

#[tokio::test]
async fn query_and_header_arguments_are_sent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/users")
            .query_param("q", "ann smith")
            .query_param("page", "2")
            .header("accept", "application/json")
            .header("x-trace-id", "t-1");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"name":"Ann Smith"}]"#);
    });

    let users: Option<Vec<User>> = client(&server)
        .call(
            "search",
            CallArgs::new()
                .arg("ann smith")
                .arg(&2)
                .headers([("X-Trace-Id", "t-1")]),
        )
        .await
        .unwrap();

    assert_eq!(users.unwrap().len(), 1);
    mock.assert();
}

#[tokio::test]
async fn null_query_argument_is_omitted() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/users")
            .query_param("q", "ann")
            .query_param_missing("page");
        then.status(200)
            .header("content-type", "application/json")
            .body("[]");
    });

    let users: Option<Vec<User>> = client(&server)
        .call(
            "search",
            CallArgs::new()
                .arg("ann")
                .arg(&Option::<u32>::None)
                .headers(Vec::<(String, String)>::new()),
        )
        .await
        .unwrap();

    assert_eq!(users, Some(Vec::new()));
    mock.assert();
}

#[tokio::test]
async fn basic_and_api_key_credentials_are_applied() {
    let server = MockServer::start();
    let basic = server.mock(|when, then| {
        when.method(GET)
            .path("/basic")
            .header("authorization", "Basic dXNlcjpwYXNz");
        then.status(204);
    });
    let api_key = server.mock(|when, then| {
        when.method(GET)
            .path("/keyed")
            .query_param("api_key", "k1")
            .header_missing("authorization");
        then.status(204);
    });

    let api = ApiDefinition::new("SecureApi")
        .base_url(server.base_url())
        .authenticated(AuthScheme::Basic)
        .basic_auth("user", "pass")
        .endpoint(EndpointSpec::get("basic", "/basic"))
        .endpoint(
            EndpointSpec::get("keyed", "/keyed")
                .authenticated(AuthScheme::ApiKey)
                .api_key("api_key", "k1", ApiKeyLocation::Query),
        );
    let client = ApiClient::builder(api)
        .config(testing_config())
        .build()
        .unwrap();

    client
        .call::<()>("basic", CallArgs::new())
        .await
        .unwrap();
    client
        .call::<()>("keyed", CallArgs::new())
        .await
        .unwrap();

    basic.assert();
    api_key.assert();
}

#[derive(Default)]
struct Tagging {
    responses: AtomicUsize,
}

impl Interceptor for Tagging {
    fn before_request(&self, endpoint: &EndpointDescriptor, request: &mut WireRequest) {
        request.headers.push((
            http::HeaderName::from_static("x-endpoint"),
            http::HeaderValue::from_str(endpoint.id()).unwrap(),
        ));
    }

    fn after_response(&self, _endpoint: &EndpointDescriptor, status: StatusCode) {
        if status.is_success() {
            self.responses.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn interceptors_see_every_call() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/users/1").header("x-endpoint", "get_user");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"name":"Ann"}"#);
    });

    let tagging = Arc::new(Tagging::default());
    let client = ApiClient::builder(user_api(&server))
        .config(testing_config())
        .interceptor(Arc::clone(&tagging))
        .build()
        .unwrap();

    for _ in 0..2 {
        client
            .call::<User>("get_user", CallArgs::new().arg(&1))
            .await
            .unwrap();
    }

    mock.assert_calls(2);
    assert_eq!(tagging.responses.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submitted_calls_complete_on_the_pool() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/users/1");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"name":"Ann"}"#);
    });

    let config = ApiClientConfig {
        max_in_flight: 2,
        ..testing_config()
    };
    let client = ApiClient::builder(user_api(&server))
        .config(config)
        .build()
        .unwrap();

    let pending: Vec<_> = (0..5)
        .map(|_| client.submit::<User>("get_user", CallArgs::new().arg(&1)))
        .collect();
    for call in pending {
        assert_eq!(call.await.unwrap(), Some(User { name: "Ann".into() }));
    }
    mock.assert_calls(5);

    client.shutdown().await;
}

#[tokio::test]
async fn async_failures_surface_through_the_future() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users/1");
        then.status(503);
    });

    let client = client(&server);
    let err = client
        .submit::<User>("get_user", CallArgs::new().arg(&1))
        .await
        .unwrap_err();
    assert_eq!(err.status_kind(), Some(StatusKind::ServiceUnavailable));

    let err = client
        .submit::<User>("missing", CallArgs::new())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_calls_then_rejects_new_ones() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/users/1");
        then.status(200)
            .header("content-type", "application/json")
            .delay(std::time::Duration::from_millis(100))
            .body(r#"{"name":"Ann"}"#);
    });

    let client = client(&server);
    let in_flight = client.submit::<User>("get_user", CallArgs::new().arg(&1));
    tokio::task::yield_now().await;

    client.shutdown().await;

    assert_eq!(in_flight.await.unwrap(), Some(User { name: "Ann".into() }));
    let err = client
        .call::<User>("get_user", CallArgs::new().arg(&1))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ShutDown);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let api = ApiDefinition::new("Offline")
        .base_url("http://127.0.0.1:1")
        .endpoint(EndpointSpec::get("ping", "/ping"));
    let client = ApiClient::builder(api)
        .config(testing_config())
        .build()
        .unwrap();

    let err = client
        .call::<serde_json::Value>("ping", CallArgs::new())
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(err.status().is_none());
}

#[tokio::test]
async fn client_configured_from_figment() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v2/users/5");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"name":"Eve"}"#);
    });

    let figment = Figment::new()
        .merge(Yaml::string(
            r#"
clients:
  users:
    base_url: "${users.host}/v2"
    max_in_flight: 3
    transport:
      request_timeout: 5s
      security: allow_insecure_http
"#,
        ))
        .merge(Serialized::defaults(json!({ "users": { "host": server.base_url() } })));

    let config = ApiClientConfig::from_figment(&figment, "clients.users").unwrap();
    let api = ApiDefinition::new("UserApi")
        .endpoint(EndpointSpec::get("get_user", "/users/{id}").path_param("id"));
    let client = ApiClient::builder(api)
        .config(config)
        .properties(figment)
        .build()
        .unwrap();

    assert_eq!(client.base_url(), format!("{}/v2", server.base_url()));
    let user: Option<User> = client
        .call("get_user", CallArgs::new().arg("5"))
        .await
        .unwrap();
    assert_eq!(user.unwrap().name, "Eve");
    mock.assert();
}
