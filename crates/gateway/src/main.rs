//! Vejovis API Gateway
//!
//! The HTTP front of the research dashboard.
//! Handles:
//! - Grounded chat turns streamed back as Server-Sent Events
//! - Read-only corpus endpoints (papers, topics, stats, direct tool calls)
//! - Bot filtering and optional per-client rate limiting
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderName},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    BoxError, Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use middleware::{guard::BotGuard, rate_limit::KeyedLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::{
    timeout::{error::Elapsed, TimeoutLayer},
    ServiceBuilder,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vejovis_common::{
    chat::{ChatPipeline, ToolExecutor},
    completion::CompletionClient,
    config::{AppConfig, ObservabilityConfig},
    db::DbPool,
    embeddings::create_embedder,
    errors::{AppError, Result},
    metrics, Corpus, Embedder, Repository,
};

/// A model provider that may be missing its credentials. The error is the
/// configuration message reported when a request needs it.
type Provider<T> = std::result::Result<T, String>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub corpus: Arc<dyn Corpus>,
    pub embedder: Provider<Arc<dyn Embedder>>,
    pub completion: Provider<CompletionClient>,
    pub guard: Arc<BotGuard>,
    pub limiter: Option<Arc<KeyedLimiter>>,
}

impl AppState {
    /// Build state around a corpus. Missing provider keys are tolerated
    /// here and reported per request.
    pub fn new(config: AppConfig, corpus: Arc<dyn Corpus>) -> Result<Self> {
        let embedder = create_embedder(&config.embedding).map_err(|e| e.to_string());
        let completion = CompletionClient::new(&config.completion).map_err(|e| e.to_string());

        if let Err(ref message) = embedder {
            warn!(error = %message, "Embedding provider unavailable, chat will fail");
        }
        if let Err(ref message) = completion {
            warn!(error = %message, "Completion provider unavailable, chat will fail");
        }

        Ok(Self {
            guard: Arc::new(BotGuard::from_config(&config.guard)?),
            limiter: middleware::rate_limit::create_rate_limiter(&config.rate_limit)?,
            config: Arc::new(config),
            corpus,
            embedder,
            completion,
        })
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder.clone().map_err(AppError::configuration)
    }

    pub fn completion(&self) -> Result<&CompletionClient> {
        self.completion.as_ref().map_err(|message| AppError::configuration(message.clone()))
    }

    pub fn executor(&self) -> Result<ToolExecutor> {
        Ok(ToolExecutor::new(
            self.corpus.clone(),
            self.embedder()?,
            self.config.retrieval.clone(),
        ))
    }

    pub fn pipeline(&self) -> Result<ChatPipeline> {
        Ok(ChatPipeline::new(self.corpus.clone(), self.executor()?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting Vejovis API Gateway v{}", vejovis_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_request_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("tool_duration_seconds".to_string()),
                metrics::EMBEDDING_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("grounding_duration_seconds".to_string()),
                metrics::EMBEDDING_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("embedding_duration_seconds".to_string()),
                metrics::EMBEDDING_BUCKETS,
            )?
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let corpus: Arc<dyn Corpus> = Arc::new(Repository::new(db));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState::new(config, corpus)?;
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open chat streams can hold the server past the deadline
            tokio::spawn(async move {
                tokio::time::sleep(shutdown_timeout).await;
                warn!("Graceful shutdown timed out, exiting");
                std::process::exit(1);
            });
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ]);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes; the guard runs first and tags the request with the client IP
    let api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/papers", get(handlers::papers::list_papers))
        .route("/papers/recent", get(handlers::papers::recent_papers))
        .route("/papers/{id}", get(handlers::papers::get_paper))
        .route("/topics", get(handlers::insights::list_topics))
        .route("/topics/{topic}/papers", get(handlers::insights::topic_papers))
        .route("/stats", get(handlers::insights::stats))
        .route("/tools/{name}", post(handlers::insights::invoke_tool))
        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::guard::bot_guard));

    // Timeouts answer with the same JSON error body as handlers
    let request_timeout = state.config.request_timeout();
    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(move |err: BoxError| async move {
            middleware_error(err, request_timeout)
        }))
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        // Health endpoints (unguarded)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

fn middleware_error(err: BoxError, timeout: Duration) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout { seconds: timeout.as_secs() }
    } else {
        AppError::Internal { message: err.to_string() }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Json,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use vejovis_common::db::{InMemoryCorpus, Paper};

    const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";

    fn paper(id: i64, title: &str, year: i32, entities: &[&str]) -> Paper {
        Paper {
            id,
            filename: Some(format!("{}.pdf", title.to_lowercase().replace(' ', "_"))),
            title: title.to_string(),
            pub_year: Some(year),
            summary: Some(format!("Summary of {}", title)),
            findings: None,
            hypothesis: None,
            entities: entities.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn corpus() -> InMemoryCorpus {
        InMemoryCorpus::new()
            .with_paper(paper(1, "Bone loss in spaceflight", 1995, &["bone", "spaceflight"]))
            .with_paper(paper(2, "Plant roots in microgravity", 2012, &["plants", "microgravity"]))
            .with_paper(paper(3, "Bone marrow adipocytes", 2018, &["bone"]))
            .with_chunk(1, "Astronauts lose bone mass at a rate of 1% per month")
    }

    fn mock_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.embedding.provider = "mock".to_string();
        config.embedding.dimension = 8;
        config.storage.pdf_base_url = Some("https://files.example.org/papers/".to_string());
        config
    }

    fn app_with(config: AppConfig, corpus: InMemoryCorpus) -> Router {
        create_router(AppState::new(config, Arc::new(corpus)).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::USER_AGENT, BROWSER_UA)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::USER_AGENT, BROWSER_UA)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let response = app_with(mock_config(), corpus()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_database_down() {
        let app = app_with(mock_config(), InMemoryCorpus::failing("no route to host"));
        let body = body_json(app.oneshot(get("/ready")).await.unwrap()).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["database"]["status"], "down");
    }

    #[tokio::test]
    async fn test_bot_user_agent_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat")
            .header(header::USER_AGENT, "python-requests/2.31")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .unwrap();

        let response = app_with(mock_config(), corpus()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "Automated access not permitted");
    }

    #[tokio::test]
    async fn test_preflight_is_answered_with_wildcard_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/chat")
            .header(header::ORIGIN, "https://dashboard.example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,apikey")
            .body(Body::empty())
            .unwrap();

        let response = app_with(mock_config(), corpus()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_chat_without_keys_is_configuration_error() {
        let app = app_with(AppConfig::default(), corpus());
        let response = app
            .oneshot(post_json("/v1/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "OPENAI_API_KEY is not set");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_history() {
        let response = app_with(mock_config(), corpus())
            .oneshot(post_json("/v1/chat", json!({"messages": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_relays_upstream_stream() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Bone\"}}]}\n\ndata: [DONE]\n\n";
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| async move {
                assert_eq!(body["messages"][0]["role"], "system");
                let system = body["messages"][0]["content"].as_str().unwrap_or_default();
                assert!(system.contains("SEMANTIC SEARCH RESULTS:"));
                assert!(system.contains("(paper:1)"));
                assert_eq!(body["messages"][1]["content"], "tell me about bone");
                ([(header::CONTENT_TYPE, "text/event-stream")], sse)
            }),
        );

        let mut config = mock_config();
        config.completion.api_key = Some("test-key".to_string());
        config.completion.endpoint = spawn_upstream(upstream).await;

        let response = app_with(config, corpus())
            .oneshot(post_json(
                "/v1/chat",
                json!({"messages": [{"role": "user", "content": "tell me about bone"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, sse.as_bytes());
    }

    #[tokio::test]
    async fn test_chat_upstream_failure_is_500_with_upstream_text() {
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "Insufficient Balance") }),
        );

        let mut config = mock_config();
        config.completion.api_key = Some("test-key".to_string());
        config.completion.endpoint = spawn_upstream(upstream).await;

        let response = app_with(config, corpus())
            .oneshot(post_json("/v1/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "Completion API Error: 402 - Insufficient Balance"
        );
    }

    #[tokio::test]
    async fn test_chat_unreachable_provider_is_500() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = mock_config();
        config.completion.api_key = Some("test-key".to_string());
        config.completion.endpoint = format!("http://{}/v1/chat/completions", addr);

        let response = app_with(config, corpus())
            .oneshot(post_json("/v1/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "COMPLETION_ERROR");
        assert!(body["error"].as_str().unwrap().starts_with("Completion API Error: "));
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_json_body() {
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "data: [DONE]\n\n"
            }),
        );

        let mut config = mock_config();
        config.server.request_timeout_secs = 1;
        config.completion.api_key = Some("test-key".to_string());
        config.completion.endpoint = spawn_upstream(upstream).await;

        let response = app_with(config, corpus())
            .oneshot(post_json("/v1/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Request timed out after 1s", "code": "TIMEOUT"})
        );
    }

    #[test]
    fn test_other_middleware_errors_are_internal() {
        let err = middleware_error("service overloaded".into(), Duration::from_secs(30));
        assert!(matches!(err, AppError::Internal { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_recent_papers_newest_first() {
        let app = app_with(mock_config(), corpus());

        let body = body_json(app.clone().oneshot(get("/v1/papers/recent?limit=2")).await.unwrap()).await;
        let ids: Vec<_> = body.as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(2)]);

        let default = body_json(app.clone().oneshot(get("/v1/papers/recent")).await.unwrap()).await;
        assert_eq!(default.as_array().unwrap().len(), 3);

        let too_many = app.oneshot(get("/v1/papers/recent?limit=500")).await.unwrap();
        assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_paper_detail_and_not_found() {
        let app = app_with(mock_config(), corpus());

        let response = app.clone().oneshot(get("/v1/papers/2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Plant roots in microgravity");
        assert_eq!(
            body["pdf_url"],
            "https://files.example.org/papers/plant_roots_in_microgravity.pdf"
        );

        let missing = app.oneshot(get("/v1/papers/99")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_papers_filters() {
        let app = app_with(mock_config(), corpus());

        let body = body_json(app.clone().oneshot(get("/v1/papers?q=bone&per_page=1")).await.unwrap()).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["papers"].as_array().unwrap().len(), 1);
        assert_eq!(body["papers"][0]["id"], 3);

        let body = body_json(app.clone().oneshot(get("/v1/papers?decade=2010")).await.unwrap()).await;
        assert_eq!(body["total"], 2);

        let body = body_json(app.oneshot(get("/v1/papers?topic=bone&year_max=2000")).await.unwrap()).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["papers"][0]["id"], 1);
    }

    #[tokio::test]
    async fn test_topics_and_stats() {
        let app = app_with(mock_config(), corpus());

        let topics = body_json(app.clone().oneshot(get("/v1/topics?limit=1")).await.unwrap()).await;
        assert_eq!(topics, json!([{"entity": "bone", "paper_count": 2}]));

        let papers = body_json(app.clone().oneshot(get("/v1/topics/bone/papers")).await.unwrap()).await;
        assert_eq!(papers["total"], 2);

        let stats = body_json(app.oneshot(get("/v1/stats")).await.unwrap()).await;
        assert_eq!(stats["papers"], 3);
        assert_eq!(stats["chunks"], 1);
        assert_eq!(stats["year_range"], json!({"min": 1995, "max": 2018}));
        assert_eq!(
            stats["by_year"],
            json!([
                {"year": 1995, "paper_count": 1},
                {"year": 2012, "paper_count": 1},
                {"year": 2018, "paper_count": 1}
            ])
        );
    }

    #[tokio::test]
    async fn test_tool_invocation() {
        let app = app_with(mock_config(), corpus());

        let body = body_json(
            app.clone()
                .oneshot(post_json("/v1/tools/count_papers", json!({"topic": "bone"})))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["tool"], "count_papers");
        assert_eq!(body["output"], "Total papers in database about \"bone\": 2");

        let unknown = app.oneshot(post_json("/v1/tools/teleport", json!({}))).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::OK);
        assert!(body_json(unknown).await["output"]
            .as_str()
            .unwrap()
            .starts_with("Unknown tool: teleport. Available: search_papers"));
    }

    #[tokio::test]
    async fn test_rate_limit_per_client_ip() {
        let mut config = mock_config();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = app_with(config, corpus());

        let from = |ip: &str| {
            Request::builder()
                .uri("/v1/stats")
                .header(header::USER_AGENT, BROWSER_UA)
                .header("x-forwarded-for", format!("{}, 10.0.0.1", ip))
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(app.clone().oneshot(from("203.0.113.7")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.clone().oneshot(from("203.0.113.7")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(app.oneshot(from("198.51.100.2")).await.unwrap().status(), StatusCode::OK);
    }
}
