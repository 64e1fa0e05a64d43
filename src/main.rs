use std::sync::Arc;

use axum::{Router, routing::get};
use clap::Parser;
use tokio_util::task::TaskTracker;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

mod auth;
mod config;
mod db;
mod llm;
mod middleware;
mod models;
mod observability;
mod rag;
mod routes;
mod services;
mod vector_store;

#[cfg(test)]
mod tests;

use crate::{
    auth::JwtValidator,
    config::AppConfig,
    db::DbPool,
    llm::{ChatModel, EmbeddingProvider},
    rag::RagComponents,
    routes::ActiveConnections,
    services::{
        DocumentProcessor, DocumentProcessorError, IngestionService, ObjectStorage, Services,
    },
    vector_store::VectorStore,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DbPool>,
    pub services: Services,
    pub jwt: Arc<JwtValidator>,
    /// Model and index handles cloned into each chat session.
    pub rag: RagComponents,
    pub connections: ActiveConnections,
    /// Background indexing runs here so shutdown can wait for it.
    pub task_tracker: TaskTracker,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        vector_store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, DocumentProcessorError> {
        let processor = Arc::new(DocumentProcessor::new(config.processing.clone())?);
        let ingestion = Arc::new(IngestionService::new(
            db.clone(),
            storage.clone(),
            processor,
            embedder.clone(),
            vector_store.clone(),
            config.vector.top_k,
        ));
        let services = Services::new(db.clone(), storage, ingestion, &config.storage);

        Ok(Self {
            jwt: Arc::new(JwtValidator::new(&config.auth)),
            rag: RagComponents {
                chat,
                embedder,
                vector_store,
                top_k: config.vector.top_k,
                memory_window: config.llm.memory_window,
            },
            connections: ActiveConnections::default(),
            task_tracker: TaskTracker::new(),
            services,
            db,
            config,
        })
    }
}

/// CLI arguments for the BRAINTOK backend
#[derive(Parser, Debug)]
#[command(version, about = "BRAINTOK document chat backend", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "braintok.toml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP and WebSocket server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
}

pub fn build_app(config: &AppConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/ready", get(routes::health::readiness))
        .route("/ws/chat", get(routes::chat_ws_handler))
        .nest("/api", routes::get_api_routes(state.clone()));

    // Layers run bottom-up: request id is assigned before the logger runs.
    app = app
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware));

    if let Some(cors_layer) = config.server.cors_layer() {
        app = app.layer(cors_layer);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Migrate) => run_migrate(&args.config).await,
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn load_config(path: &str) -> AppConfig {
    match AppConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Log a fatal startup error and exit.
fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    tracing::error!(error = %err, "{context}");
    eprintln!("Error: {context}: {err}");
    std::process::exit(1);
}

async fn run_server(config_path: &str) {
    let config = load_config(config_path);

    let _tracing_guard = match observability::init_tracing(&config.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(config_file = %config_path, "Starting BRAINTOK backend");

    let db = match DbPool::from_config(&config.database).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => fail("Failed to connect to database", e),
    };
    if config.database.run_migrations() {
        if let Err(e) = db.run_migrations().await {
            fail("Database migrations failed", e);
        }
        tracing::info!("Database migrations applied");
    }

    let storage: Arc<dyn ObjectStorage> =
        Arc::new(services::S3ObjectStorage::new(&config.storage).await);
    let vector_store: Arc<dyn VectorStore> =
        match vector_store::PineconeStore::new(&config.vector) {
            Ok(store) => Arc::new(store),
            Err(e) => fail("Failed to initialize vector store", e),
        };
    let chat: Arc<dyn ChatModel> = match llm::OpenAiChatModel::new(&config.llm) {
        Ok(model) => Arc::new(model),
        Err(e) => fail("Failed to initialize chat model", e),
    };
    let embedder: Arc<dyn EmbeddingProvider> = match llm::OpenAiEmbeddings::new(&config.llm) {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => fail("Failed to initialize embeddings client", e),
    };

    let config = Arc::new(config);
    let state = match AppState::new(config.clone(), db, storage, vector_store, chat, embedder) {
        Ok(state) => state,
        Err(e) => fail("Failed to initialize document processor", e),
    };

    let task_tracker = state.task_tracker.clone();
    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => fail("Failed to bind to address", e),
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(task_tracker))
        .await
    {
        fail("Server error", e);
    }
}

async fn shutdown_signal(task_tracker: TaskTracker) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for indexing tasks to complete...");

    task_tracker.close();

    let wait_result =
        tokio::time::timeout(std::time::Duration::from_secs(30), task_tracker.wait()).await;

    match wait_result {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

async fn run_migrate(config_path: &str) {
    let config = load_config(config_path);

    let _tracing_guard = match observability::init_tracing(&config.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(config_file = %config_path, "Running database migrations");

    match DbPool::from_config(&config.database).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
                std::process::exit(0);
            }
            Err(e) => fail("Database migrations failed", e),
        },
        Err(e) => fail("Failed to connect to database", e),
    }
}
