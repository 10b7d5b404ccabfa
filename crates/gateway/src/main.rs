//! ChatForge API Gateway
//!
//! The entry point for all external requests.
//! Handles:
//! - Chat, Kakao and Telegram exchanges
//! - History, inquiries and index rebuilds
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use chatforge_common::{
    config::{AppConfig, ObservabilityConfig},
    db::TenantDatabases,
    embeddings::{create_embedder, Embedder},
    generation::ResponseGenerator,
    llm::{LanguageModel, OpenAiChatClient},
    metrics::{self, RequestMetrics, EMBEDDING_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    notify::{NotificationRelay, Notifier, TelegramNotifier},
    ConversationStore, TenantRegistry, VERSION,
};
use chatforge_indexer::{ChunkingConfig, IndexBuilder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use middleware::{rate_limit_middleware, RateLimit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tenants: Arc<TenantRegistry>,
    pub store: ConversationStore,
    pub generator: Arc<ResponseGenerator>,
    pub builder: Arc<IndexBuilder>,
    pub relay: NotificationRelay,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        tenants: Arc<TenantRegistry>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        notifier: Arc<dyn Notifier>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let store = ConversationStore::new(TenantDatabases::new(&config.storage));
        let generator = ResponseGenerator::new(
            llm,
            embedder.clone(),
            store.clone(),
            config.generation.clone(),
            &config.llm,
        );
        let builder = IndexBuilder::new(embedder, ChunkingConfig::from(&config.indexing));

        Self {
            config,
            tenants,
            store,
            generator: Arc::new(generator),
            builder: Arc::new(builder),
            relay: NotificationRelay::new(notifier),
            metrics,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting ChatForge API Gateway v{}", VERSION
    );

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_embedding_duration_seconds", METRICS_PREFIX)),
                EMBEDDING_BUCKETS,
            )?
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let tenants = TenantRegistry::from_process_env(&config.storage.data_dir);
    if tenants.ready_tenants().is_empty() {
        warn!("No fully configured tenants, every chat request will be rejected");
    }

    let llm = Arc::new(OpenAiChatClient::new(&config.llm)?);
    let embedder = create_embedder(&config.embedding)?;
    let notifier = Arc::new(TelegramNotifier::new(&config.notification)?);

    let config = Arc::new(config);
    let state = AppState::new(
        config.clone(),
        Arc::new(tenants),
        llm,
        embedder,
        notifier,
        metrics_handle,
    );

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let fmt = tracing_subscriber::fmt::layer().with_target(true);

    if config.json_logging {
        tracing_subscriber::registry().with(filter).with(fmt.json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut routes = Router::new()
        // Chat and platform webhooks
        .route("/chatbot/{tenant_id}", post(handlers::chat::chat))
        .route(
            "/chatbot/kakao/{tenant_id}",
            get(handlers::kakao::notice).post(handlers::kakao::skill),
        )
        .route("/chatbot/telegram/{tenant_id}", post(handlers::telegram::webhook))

        // History
        .route("/chatbot/history/{tenant_id}", get(handlers::history::recent))
        .route("/chatbot/history/{tenant_id}/search", get(handlers::history::search))

        // Inquiries
        .route("/submit-inquiry/{tenant_id}", post(handlers::inquiries::submit))
        .route("/inquiries/{tenant_id}", get(handlers::inquiries::list))

        // Document index
        .route("/update-db/{tenant_id}", post(handlers::index::update_db));

    if config.rate_limit.enabled {
        let limit = RateLimit::new(config.rate_limit.requests_per_second, config.rate_limit.burst);
        routes = routes.layer(from_fn_with_state(limit, rate_limit_middleware));
    }

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .merge(routes)
        .layer(from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests.max(1)))
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Count requests and their latency by route template
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let tracker = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());
    response
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, StatusCode},
    };
    use chatforge_common::{
        embeddings::HashEmbedder,
        llm::{LlmError, MockLanguageModel},
        notify::NotifyError,
    };
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }

        /// Delivery runs on a detached task, so wait for it to land
        async fn wait_for(&self, count: usize) -> Vec<(String, String, String)> {
            for _ in 0..100 {
                if self.sent.lock().unwrap().len() >= count {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            self.sent()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, token: &str, channel: &str, text: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((token.to_string(), channel.to_string(), text.to_string()));
            if self.fail {
                Err(NotifyError::Rejected { status: 403, body: "bot was kicked".into() })
            } else {
                Ok(())
            }
        }
    }

    struct TestApp {
        router: Router,
        llm: Arc<MockLanguageModel>,
        notifier: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    fn env(data: &Path, extra: &[(&str, String)]) -> Vec<(String, String)> {
        let mut vars = vec![
            ("TENANT_IDS".to_string(), "acme,beta".to_string()),
            ("AI_MODEL_acme".to_string(), "m1".to_string()),
            ("OPENAI_API_KEY_acme".to_string(), "sk-acme".to_string()),
            ("AI_MODEL_beta".to_string(), "m2".to_string()),
            ("STORAGE_DIR_acme".to_string(), data.join("acme").display().to_string()),
        ];
        vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        vars
    }

    fn app_with(llm: MockLanguageModel, extra: &[(&str, String)]) -> TestApp {
        app_with_notifier(llm, extra, RecordingNotifier::default())
    }

    fn app_with_notifier(
        llm: MockLanguageModel,
        extra: &[(&str, String)],
        notifier: RecordingNotifier,
    ) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.rate_limit.enabled = false;

        let tenants = TenantRegistry::from_env(env(dir.path(), extra), dir.path());
        let llm = Arc::new(llm);
        let notifier = Arc::new(notifier);
        let state = AppState::new(
            Arc::new(config),
            Arc::new(tenants),
            llm.clone(),
            Arc::new(HashEmbedder::new(64)),
            notifier.clone(),
            None,
        );

        TestApp {
            router: create_router(state),
            llm,
            notifier,
            _dir: dir,
        }
    }

    fn app() -> TestApp {
        app_with(MockLanguageModel::replying("Hi!"), &[])
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app.router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_round_trip_is_persisted() {
        let app = app();
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "reply": "Hi!" }));
        assert_eq!(app.llm.calls(), 1);
        assert_eq!(app.llm.requests()[0].model, "m1");

        let (status, body) = send(&app.router, Method::GET, "/chatbot/history/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["history"].as_array().unwrap().len(), 1);
        assert_eq!(body["history"][0]["message"], "Hello");
        assert_eq!(body["history"][0]["reply"], "Hi!");
    }

    fn notify_vars() -> Vec<(&'static str, String)> {
        vec![
            ("TENANT_FEATURES_acme", "notify".to_string()),
            ("TELEGRAM_BOT_TOKEN_acme", "123:abc".to_string()),
            ("TELEGRAM_CHAT_ID_acme", "-100200".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_exchange_is_relayed_after_persisting() {
        let app = app_with(MockLanguageModel::replying("Hi!"), &notify_vars());
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Hi!");

        let sent = app.notifier.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "123:abc");
        assert_eq!(sent[0].1, "-100200");
        assert!(sent[0].2.contains("Hello") && sent[0].2.contains("Hi!"));

        let (_, body) = send(&app.router, Method::GET, "/chatbot/history/acme", None).await;
        assert_eq!(body["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_affect_reply() {
        let app = app_with_notifier(
            MockLanguageModel::replying("Hi!"),
            &notify_vars(),
            RecordingNotifier { fail: true, ..Default::default() },
        );
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "reply": "Hi!" }));
        assert_eq!(app.notifier.wait_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_tenant_is_not_relayed() {
        let app = app();
        let (status, _) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tokio::task::yield_now().await;
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_never_reach_the_model() {
        let app = app();

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/nope",
            Some(json!({ "message": "Hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "UNKNOWN_TENANT");

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/beta",
            Some(json!({ "message": "Hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INCOMPLETE_CONFIGURATION");
        assert_eq!(body["error"]["details"]["missing"][0], "OPENAI_API_KEY_beta");

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app.router, Method::POST, "/chatbot/acme", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/chatbot/acme")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(app.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_degraded_reply_is_returned_and_stored() {
        let app = app_with(MockLanguageModel::failing(LlmError::Authentication { status: 401 }), &[]);
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error_kind"], "authentication");
        assert!(body["reply"].as_str().unwrap().starts_with("❌"));

        let (_, body) = send(&app.router, Method::GET, "/chatbot/history/acme?limit=5", None).await;
        assert_eq!(body["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_reports_computed_reply() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let app = app_with(
            MockLanguageModel::replying("Hi!"),
            &[("STORAGE_DIR_acme", blocker.join("acme").display().to_string())],
        );

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/acme",
            Some(json!({ "message": "Hello" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "STORAGE_ERROR");
        assert_eq!(body["error"]["details"]["reply"], "Hi!");
        assert_eq!(app.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_kakao_webhook() {
        let app = app();

        let (status, body) = send(&app.router, Method::GET, "/chatbot/kakao/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("POST"));

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/kakao/acme",
            Some(json!({ "userRequest": { "utterance": "Hello" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "2.0");
        assert_eq!(body["template"]["outputs"][0]["simpleText"]["text"], "Hi!");
    }

    #[tokio::test]
    async fn test_telegram_webhook_answers_mentions_only() {
        let app = app_with(
            MockLanguageModel::replying("Hi!"),
            &[("TELEGRAM_BOT_USERNAME_acme", "acme_bot".to_string())],
        );

        let update = |text: &str| {
            json!({
                "update_id": 1,
                "message": { "message_id": 42, "chat": { "id": -100 }, "text": text }
            })
        };

        let (status, _) = send(&app.router, Method::POST, "/chatbot/telegram/acme", Some(update("hello all"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.llm.calls(), 0);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/telegram/acme",
            Some(update("@acme_bot hello")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "sendMessage");
        assert_eq!(body["chat_id"], -100);
        assert_eq!(body["text"], "Hi!");
        assert_eq!(app.llm.requests()[0].messages[1].content, "hello");
    }

    #[tokio::test]
    async fn test_telegram_storage_failure_still_replies() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let app = app_with(
            MockLanguageModel::replying("Hi!"),
            &[("STORAGE_DIR_acme", blocker.join("acme").display().to_string())],
        );

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/chatbot/telegram/acme",
            Some(json!({
                "update_id": 3,
                "message": { "message_id": 9, "chat": { "id": -100 }, "text": "hello" }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "sendMessage");
        assert_eq!(body["text"], "Hi!");
        assert_eq!(app.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_inquiries() {
        let app = app();

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/submit-inquiry/acme",
            Some(json!({ "contact": "kim@example.com", "inquiry": "Call me" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["message"].is_string());

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/submit-inquiry/acme",
            Some(json!({ "contact": " ", "inquiry": "Call me" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app.router, Method::GET, "/inquiries/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inquiries"].as_array().unwrap().len(), 1);
        assert_eq!(body["inquiries"][0]["contact"], "kim@example.com");
    }

    #[tokio::test]
    async fn test_update_db() {
        let app = app();
        let docs = app._dir.path().join("acme").join("documents");

        let (status, body) = send(&app.router, Method::POST, "/update-db/acme", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "NO_SOURCE_DOCUMENTS");

        std::fs::create_dir_all(&docs).unwrap();
        let (status, body) = send(&app.router, Method::POST, "/update-db/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "empty");

        std::fs::write(docs.join("faq.md"), "Refunds are accepted within 30 days.").unwrap();
        let (status, body) = send(&app.router, Method::POST, "/update-db/acme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "built");
        assert_eq!(body["files"], 1);
        assert_eq!(body["embedding_model"], "hash-64");

        std::fs::write(docs.join("price.xlsx"), "binary").unwrap();
        let (status, body) = send(&app.router, Method::POST, "/update-db/acme", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "UNSUPPORTED_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_history_search() {
        let app = app();
        for message in ["refund please", "opening hours", "another refund"] {
            send(&app.router, Method::POST, "/chatbot/acme", Some(json!({ "message": message }))).await;
        }

        let (status, body) = send(
            &app.router,
            Method::GET,
            "/chatbot/history/acme/search?keyword=refund",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["message"], "another refund");

        let (status, _) = send(&app.router, Method::GET, "/chatbot/history/acme/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
