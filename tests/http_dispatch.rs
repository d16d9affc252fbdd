//! End-to-end dispatch tests against a mock Trello server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trellis::{
    validate_id, BinaryPart, Config, EncodingOptions, HttpMethod, HttpTransport, ParamBag,
    TrellisError, TrelloClient,
};

fn config(server: &MockServer, attempts: u32) -> Config {
    Config::new("test-key", "test-token")
        .with_base_url(format!("{}/1", server.uri()))
        .unwrap()
        .with_backoff(Duration::from_millis(1))
        .with_max_retry_attempts(attempts)
}

fn client(server: &MockServer, attempts: u32) -> TrelloClient {
    TrelloClient::new(&config(server, attempts)).unwrap()
}

#[tokio::test]
async fn create_board_sends_flattened_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/boards"))
        .and(query_param("name", "Test Board"))
        .and(query_param("defaultLabels", "false"))
        .and(query_param("defaultLists", "true"))
        .and(query_param("prefs_permissionLevel", "private"))
        .and(query_param("key", "test-key"))
        .and(query_param("token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "b1", "name": "Test Board"})))
        .expect(1)
        .mount(&server)
        .await;

    let board: Value = client(&server, 5)
        .post(
            "/boards",
            ParamBag::new()
                .with("name", "Test Board")
                .with("defaultLabels", false)
                .with("defaultLists", true)
                .with("prefs", ParamBag::new().with("permissionLevel", "private")),
        )
        .await
        .unwrap();

    assert_eq!(board["id"], "b1");
}

#[tokio::test]
async fn credentials_come_last() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/boards/b1/cards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let _: Value = client(&server, 1)
        .get("/boards/b1/cards", ParamBag::new().with("filter", "open").with("fields", "name"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let keys: Vec<String> = requests[0].url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    assert_eq!(keys, vec!["filter", "fields", "key", "token"]);
}

#[tokio::test]
async fn list_parameter_is_comma_joined() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/1/cards/c1"))
        .and(query_param("idMembers", "3d75,fa75,e90c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
        .expect(1)
        .mount(&server)
        .await;

    let _: Value = client(&server, 1)
        .put("/cards/c1", ParamBag::new().with("idMembers", vec!["3d75", "fa75", "e90c"]))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().unwrap().contains("idMembers=3d75,fa75,e90c"));
}

#[tokio::test]
async fn slash_separator_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/1/boards/b1"))
        .and(query_param("prefs/background", "blue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let _: Value = client(&server, 1)
        .put_with(
            "/boards/b1",
            ParamBag::new().with("prefs", ParamBag::new().with("background", "blue")),
            EncodingOptions::slash(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn rate_limited_twice_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/members/me"))
        .respond_with(ResponseTemplate::new(429).set_body_string("API_TOKEN_LIMIT_EXCEEDED"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1/members/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
        .expect(1)
        .mount(&server)
        .await;

    let member: Value = client(&server, 5)
        .get("/members/me", ParamBag::new())
        .await
        .unwrap();

    assert_eq!(member["id"], "m1");
}

#[tokio::test]
async fn server_error_exhausts_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/lists/l1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .get::<Value>("/lists/l1", ParamBag::new())
        .await
        .unwrap_err();

    match err {
        TrellisError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, TrellisError::ServerError { status: 500 }));
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/cards"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid value for idList"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5)
        .post::<Value>("/cards", ParamBag::new().with("idList", "nope"))
        .await
        .unwrap_err();

    match err {
        TrellisError::ClientError { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid value for idList");
        }
        other => panic!("expected ClientError, got {other:?}"),
    }
}

#[tokio::test]
async fn retry_after_header_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = client(&server, 1)
        .get::<Value>("/boards/b1", ParamBag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TrellisError::ExhaustedRetries { attempts: 1, .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn upload_moves_every_parameter_into_multipart_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/cards/c1/attachments"))
        .and(query_param("key", "test-key"))
        .and(query_param("token", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a1"})))
        .expect(1)
        .mount(&server)
        .await;

    let file = BinaryPart::new("file", "notes.txt", b"hello trello".to_vec()).with_mime_type("text/plain");
    let attachment: Value = client(&server, 1)
        .upload(
            HttpMethod::Post,
            "/cards/c1/attachments",
            ParamBag::new().with("name", "Meeting notes").with("setCover", false),
            file,
        )
        .await
        .unwrap();
    assert_eq!(attachment["id"], "a1");

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];

    let query_keys: Vec<String> = request.url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    assert_eq!(query_keys, vec!["key", "token"]);

    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"name\""));
    assert!(body.contains("Meeting notes"));
    assert!(body.contains("name=\"setCover\""));
    assert!(body.contains("name=\"file\"; filename=\"notes.txt\""));
    assert!(body.contains("hello trello"));
}

#[tokio::test]
async fn put_json_sends_body_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/1/cards/c1/customField/f1/item"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"value": {"checked": "true"}})))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "i1"})))
        .expect(1)
        .mount(&server)
        .await;

    let item: Value = client(&server, 1)
        .put_json(
            "/cards/c1/customField/f1/item",
            ParamBag::new(),
            json!({"value": {"checked": "true"}}),
        )
        .await
        .unwrap();
    assert_eq!(item["id"], "i1");
}

#[tokio::test]
async fn timeout_is_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let transport = HttpTransport::with_timeout(Duration::from_millis(50)).unwrap();
    let client = TrelloClient::with_transport(&config(&server, 2), transport);

    let err = client.get::<Value>("/boards/b1", ParamBag::new()).await.unwrap_err();

    match err {
        TrellisError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, TrellisError::Timeout { .. }));
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
}

#[tokio::test]
async fn network_failure_hides_credentials() {
    // Port 1 is reserved and nothing listens on it.
    let config = Config::new("test-key", "test-token")
        .with_base_url("http://127.0.0.1:1/1")
        .unwrap()
        .with_backoff(Duration::from_millis(1))
        .with_max_retry_attempts(2);

    let client = TrelloClient::new(&config).unwrap();
    let err = client.get::<Value>("/boards/b1", ParamBag::new()).await.unwrap_err();

    assert!(matches!(err, TrellisError::ExhaustedRetries { attempts: 2, .. }));
    let mut chain = String::new();
    let mut source: Option<&dyn std::error::Error> = Some(&err);
    while let Some(e) = source {
        chain.push_str(&e.to_string());
        source = e.source();
    }
    assert!(!chain.contains("test-key"));
    assert!(!chain.contains("test-token"));
}

#[tokio::test]
async fn validation_happens_before_network() {
    let server = MockServer::start().await;
    let client = client(&server, 5);

    let err = validate_id("", "idBoard").unwrap_err();
    assert!(matches!(err, TrellisError::Validation(_)));

    let err = client.batch(&[]).await.unwrap_err();
    assert!(matches!(err, TrellisError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_id_in_path_is_rejected_locally() {
    let server = MockServer::start().await;
    let client = client(&server, 5);

    let err = client
        .get::<Value>("/boards/b1?fields=all/lists", ParamBag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn client_error_body_echoing_token_is_redacted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/members/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token test-token"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5)
        .get::<Value>("/members/me", ParamBag::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    let display = err.to_string();
    assert!(!display.contains("test-token"), "leaked: {display}");
    assert!(display.contains("[REDACTED]"));
}
