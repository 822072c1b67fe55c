use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use knowledge_base_client::{
    cache_key, classify,
    classify::{MSG_NETWORK, MSG_NOT_FOUND},
    types::{
        ListDocumentsRequest, QuestionRequest, RecommendRequest, SearchRequest, SummarizeRequest,
    },
    ApiClient, ApiError, ApiStore, ClientConfig, DashboardCache, ErrorKind, ErrorRecord,
    MemoryStore, Notifier, RequestDescriptor, RequestObserver, RequestOptions, ResponseEnvelope,
    RetryPolicy, UploadRequest,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: JsonValue) -> Self {
        Self::json(StatusCode::OK, body)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl RecordedRequest {
    fn json(&self) -> JsonValue {
        serde_json::from_slice(&self.body).expect("request body must be JSON")
    }

    fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn catch_all(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(RecordedRequest {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            headers,
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"detail": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }

    fn hits(&self) -> usize {
        self.requests.lock().expect("request log").len()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new().fallback(catch_all).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        requests: state.requests,
        task,
    }
}

/// Records every observer and notifier callback in order.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    failures: Mutex<Vec<ErrorRecord>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events").clone()
    }

    fn notifications(&self) -> Vec<String> {
        self.notifications.lock().expect("notifications").clone()
    }

    fn failures(&self) -> Vec<ErrorRecord> {
        self.failures.lock().expect("failures").clone()
    }

    fn push(&self, event: &str) {
        self.events.lock().expect("events").push(event.to_owned());
    }
}

impl RequestObserver for Recorder {
    fn show_loading(&self, _request: &RequestDescriptor) {
        self.push("show_loading");
    }

    fn hide_loading(&self, _request: &RequestDescriptor) {
        self.push("hide_loading");
    }

    fn on_start(&self, _request: &RequestDescriptor) {
        self.push("start");
    }

    fn on_success(&self, _response: &ResponseEnvelope) {
        self.push("success");
    }

    fn on_failure(&self, _request: &RequestDescriptor, record: &ErrorRecord) {
        self.push("failure");
        self.failures.lock().expect("failures").push(record.clone());
    }
}

impl Notifier for Recorder {
    fn notify_error(&self, message: &str) {
        self.notifications
            .lock()
            .expect("notifications")
            .push(message.to_owned());
    }
}

fn client_for(server: &TestServer, recorder: &Arc<Recorder>) -> ApiClient {
    ApiClient::new(ClientConfig::new(&server.base_url))
        .expect("mock server URL is valid")
        .with_observer(recorder.clone())
        .with_notifier(recorder.clone())
}

fn search_body() -> JsonValue {
    json!({
        "total": 1,
        "results": [{
            "id": 3,
            "title": "Amazon VPC",
            "content": "A virtual private cloud...",
            "source": "aws/networking/vpc.md",
            "score": 0.92,
            "metadata": {"provider": "aws"}
        }],
        "query": "vpc",
        "search_type": "semantic",
        "processing_time": 12.5
    })
}

#[tokio::test]
async fn search_sends_get_with_query_params() {
    let server = spawn_server(vec![MockResponse::ok(search_body())]).await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let response = client
        .knowledge()
        .search(&SearchRequest::new("vpc").with_filter("provider", "aws"))
        .await
        .expect("search must succeed");

    assert_eq!(response.total, 1);
    assert_eq!(response.results[0].id.as_str(), "3");
    assert_eq!(response.results[0].title, "Amazon VPC");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/api/v1/knowledge/search");
    let query = requests[0].query.clone().expect("query string");
    assert!(query.contains("query=vpc"));
    assert!(query.contains("search_type=semantic"));
    assert!(query.contains("limit=10"));
    assert!(query.contains("provider=aws"));

    assert_eq!(
        recorder.events(),
        vec!["show_loading", "start", "hide_loading", "success"]
    );
    assert!(recorder.notifications().is_empty());
}

#[tokio::test]
async fn ask_question_posts_json_body() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "answer": "A VPC is an isolated network.",
        "confidence": 0.8,
        "sources": [{"document": "vpc.md", "excerpt": "isolated", "relevance": 0.9}],
        "processing_time": 40.0
    }))])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let mut question = QuestionRequest::new("What is a VPC?");
    question.context = vec!["vpc.md".to_owned()];
    let answer = client
        .knowledge()
        .ask_question(&question)
        .await
        .expect("question must succeed");

    assert_eq!(answer.sources.len(), 1);
    let request = &server.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/v1/knowledge/qa");
    assert_eq!(
        request.json(),
        json!({
            "question": "What is a VPC?",
            "context": ["vpc.md"],
            "max_tokens": 1000,
            "temperature": 0.7
        })
    );
}

#[tokio::test]
async fn summarize_and_reindex_use_post() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({
            "summary": "short",
            "original_length": 100,
            "summary_length": 5,
            "compression_ratio": 0.05
        })),
        MockResponse::ok(json!({"message": "reindex started", "total_documents": 9})),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let summary = client
        .knowledge()
        .summarize(&SummarizeRequest::new("long text"))
        .await
        .expect("summarize must succeed");
    assert_eq!(summary.summary, "short");

    let reindex = client.admin().reindex().await.expect("reindex must succeed");
    assert_eq!(reindex.message, "reindex started");
    assert_eq!(reindex.details["total_documents"], json!(9));

    let requests = server.requests();
    assert_eq!(requests[0].path, "/api/v1/knowledge/summarize");
    assert_eq!(requests[0].json()["style"], json!("default"));
    assert_eq!(requests[1].method, Method::POST);
    assert_eq!(requests[1].path, "/api/v1/admin/reindex");
}

#[tokio::test]
async fn enveloped_response_is_unwrapped() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "success": true,
        "data": {
            "vector_store": {"total_documents": 5, "total_chunks": 50},
            "last_updated": 1700000000.0
        },
        "message": "ok",
        "timestamp": "2024-05-01T10:00:00Z"
    }))])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let stats = client.knowledge().stats().await.expect("stats must succeed");
    assert_eq!(stats.vector_store.total_documents, 5);
    assert_eq!(stats.vector_store.total_chunks, 50);
}

#[tokio::test]
async fn not_found_is_classified_notified_once_and_reraised() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"detail": "Document not found"}),
    )])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let err = client
        .admin()
        .delete_document(&"7".into())
        .await
        .expect_err("delete must fail");

    assert_eq!(err.status(), Some(404));
    assert_eq!(classify(&err), ErrorKind::NotFound);
    assert_eq!(recorder.notifications(), vec![MSG_NOT_FOUND.to_owned()]);
    assert_eq!(
        recorder.events(),
        vec!["show_loading", "start", "hide_loading", "failure"]
    );
    assert_eq!(recorder.failures()[0].kind, ErrorKind::NotFound);

    let request = &server.requests()[0];
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/api/v1/admin/documents/7");
}

#[tokio::test]
async fn rejected_upload_is_unclassified_and_notified_once() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::PAYLOAD_TOO_LARGE,
        json!({"detail": "File too large"}),
    )])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let upload = UploadRequest::new("ecs.md", b"# Amazon ECS".to_vec())
        .with_provider("aws")
        .with_category("compute");
    let err = client
        .admin()
        .upload_document(upload)
        .await
        .expect_err("upload must fail");

    assert!(matches!(err, ApiError::Http { status: 413, .. }));
    assert_eq!(
        classify(&err),
        ErrorKind::Unclassified(Some("File too large".to_owned()))
    );
    assert_eq!(recorder.notifications(), vec!["File too large".to_owned()]);

    let request = &server.requests()[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/api/v1/admin/documents/upload");
    let content_type = request
        .header(header::CONTENT_TYPE)
        .expect("content type must be set");
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("filename=\"ecs.md\""));
    assert!(body.contains("name=\"provider\""));
    assert!(body.contains("# Amazon ECS"));
}

#[tokio::test]
async fn quiet_requests_skip_loading_and_notification() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"detail": "embedding backend down"}),
    )])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let err = client
        .knowledge()
        .with_options(RequestOptions::quiet())
        .recommend(&RecommendRequest::new(12_i64))
        .await
        .expect_err("recommend must fail");

    assert_eq!(classify(&err), ErrorKind::ServerError);
    assert!(recorder.notifications().is_empty());
    assert_eq!(recorder.events(), vec!["start", "failure"]);

    let query = server.requests()[0].query.clone().expect("query string");
    assert!(query.contains("document_id=12"));
    assert!(query.contains("similarity_threshold=0.7"));
}

#[tokio::test]
async fn unreachable_server_is_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind probe listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);

    let recorder = Arc::new(Recorder::default());
    let client = ApiClient::new(ClientConfig::new(format!("http://{address}")))
        .expect("valid URL")
        .with_observer(recorder.clone())
        .with_notifier(recorder.clone());

    let err = client
        .admin()
        .health()
        .await
        .expect_err("nothing is listening");

    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(classify(&err), ErrorKind::NetworkUnreachable);
    assert_eq!(recorder.notifications(), vec![MSG_NETWORK.to_owned()]);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"status": "healthy"})).with_delay(Duration::from_millis(150)),
    ])
    .await;
    let config = ClientConfig {
        timeout_ms: 20,
        ..ClientConfig::new(&server.base_url)
    };
    let client = ApiClient::new(config).expect("valid URL");

    let err = client.admin().health().await.expect_err("request must time out");

    match err {
        ApiError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_api_key_is_a_client_fault_not_a_network_failure() {
    let server = spawn_server(vec![MockResponse::ok(json!({"status": "healthy"}))]).await;
    let config = ClientConfig {
        api_key: Some("abc\u{7f}def".to_owned()),
        ..ClientConfig::new(&server.base_url)
    };

    let err = ApiClient::new(config).expect_err("key cannot be sent as a header");

    assert!(matches!(err, ApiError::Config(_)));
    assert!(matches!(
        classify(&err),
        ErrorKind::ClientConfigurationError(Some(_))
    ));
    assert_ne!(classify(&err).message(), MSG_NETWORK);
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn retry_policy_recovers_from_server_error() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": "boom"})),
        MockResponse::ok(json!({"status": "healthy", "version": "1.0.0"})),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);
    let client = &client;

    let report = RetryPolicy::new(3, Duration::from_millis(1))
        .run(|| async move { client.admin().health().await })
        .await
        .expect("health must succeed after retry");

    assert!(report.is_healthy());
    assert_eq!(report.details["version"], json!("1.0.0"));
    assert_eq!(server.hits(), 2);
    assert_eq!(recorder.notifications().len(), 1);
}

#[tokio::test]
async fn transient_only_policy_does_not_retry_not_found() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::NOT_FOUND, json!({})),
        MockResponse::ok(json!({"status": "healthy"})),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);
    let client = &client;

    let err = RetryPolicy::new(3, Duration::from_millis(1))
        .transient_only()
        .run(|| async move { client.admin().metrics().await })
        .await
        .expect_err("404 must not be retried");

    assert_eq!(err.status(), Some(404));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn list_documents_decodes_paginated_page() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "items": [
            {"id": 1, "filename": "vpc.md", "title": "VPC", "status": "processed", "size": "2048"},
            {"id": "b-2", "filename": "ecs.md"}
        ],
        "total": 7,
        "page": 2,
        "size": 5,
        "pages": 2
    }))])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);

    let page = client
        .admin()
        .with_options(RequestOptions::background())
        .list_documents(ListDocumentsRequest { page: 2, size: 5 })
        .await
        .expect("list must succeed");

    assert_eq!(page.total, 7);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[1].id.as_str(), "b-2");
    assert_eq!(server.requests()[0].query.as_deref(), Some("page=2&size=5"));
    assert_eq!(recorder.events(), vec!["start", "success"]);
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let server = spawn_server(vec![MockResponse::ok(json!({"cpu_usage": 3.5}))]).await;
    let config = ClientConfig {
        api_key: Some("kb_live_0123456789abcdef".to_owned()),
        ..ClientConfig::new(&server.base_url)
    };
    let client = ApiClient::new(config).expect("valid URL");

    let metrics = client.admin().metrics().await.expect("metrics must succeed");

    assert_eq!(metrics["cpu_usage"], json!(3.5));
    assert_eq!(
        server.requests()[0].header(header::AUTHORIZATION),
        Some("Bearer kb_live_0123456789abcdef")
    );
}

#[tokio::test]
async fn store_tracks_requests_and_serves_cached_results() {
    let server = spawn_server(vec![
        MockResponse::ok(search_body()),
        MockResponse::json(StatusCode::UNAUTHORIZED, json!({})),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);
    let store = ApiStore::new().with_notifier(recorder.clone());

    let request = SearchRequest::new("vpc");
    let key = cache_key("search", request_params(&request));
    for _ in 0..2 {
        if store.get(&key).is_some() {
            continue;
        }
        let response = store
            .track(client.knowledge().search(&request))
            .await
            .expect("search must succeed");
        store
            .set_as(key.clone(), &response.total, Duration::from_secs(60))
            .expect("cache write");
    }
    assert_eq!(server.hits(), 1);
    assert_eq!(store.get_as::<u64>(&key), Some(1));

    let err = store
        .track(client.admin().health())
        .await
        .expect_err("unauthorized");
    assert_eq!(classify(&err), ErrorKind::Unauthorized);

    let stats = store.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.error_rate, 50.0);
    assert_eq!(
        store.error().map(|record| record.kind),
        Some(ErrorKind::Unauthorized)
    );
    assert_eq!(recorder.notifications().len(), 1);
}

fn request_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
    vec![
        ("query", request.query.clone()),
        ("limit", request.limit.to_string()),
        ("search_type", request.search_type.as_str().to_owned()),
    ]
}

#[tokio::test]
async fn check_health_reports_server_status() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"status": "healthy"})),
        MockResponse::ok(json!({"status": "degraded"})),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);
    let store = ApiStore::new();

    assert!(store.check_health(&client).await);
    assert!(!store.check_health(&client).await);
    assert_eq!(store.stats().total_requests, 2);
}

#[tokio::test]
async fn dashboard_serves_cache_until_forced() {
    let stats_body = json!({
        "vector_store": {
            "total_documents": 2,
            "total_chunks": 14,
            "provider_distribution": {"AWS": {"count": 2, "percentage": 100.0}}
        },
        "last_updated": 1700000000.0
    });
    let server = spawn_server(vec![
        MockResponse::ok(stats_body.clone()),
        MockResponse::ok(stats_body),
    ])
    .await;
    let recorder = Arc::new(Recorder::default());
    let client = client_for(&server, &recorder);
    let storage = Arc::new(MemoryStore::new());
    let dashboard = DashboardCache::new(storage.clone());

    let first = dashboard
        .fetch_stats(&client, false)
        .await
        .expect("first fetch");
    let second = dashboard
        .fetch_stats(&client, false)
        .await
        .expect("cached fetch");
    assert_eq!(first, second);
    assert_eq!(server.hits(), 1);
    assert_eq!(dashboard.provider_count("AWS"), 2);

    // A fresh cache over the same storage restores the snapshot.
    let restored = DashboardCache::new(storage);
    assert!(restored.is_cache_valid());
    assert_eq!(restored.stats().map(|stats| stats.total_chunks), Some(14));

    dashboard.refresh_stats(&client).await.expect("forced fetch");
    assert_eq!(server.hits(), 2);
    assert!(!recorder.events().contains(&"show_loading".to_owned()));
}
