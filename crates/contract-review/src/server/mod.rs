//! HTTP API.
//!
//! [`build_router`] wires every route onto an [`AppState`]; [`serve`] binds
//! the configured address and runs until Ctrl-C.

mod contracts;
mod middleware;
mod response;
mod rules;

use std::fmt;
use std::sync::{Arc, Mutex};

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::convert::{DocumentConverter, RemoteConverter, TextOnlyConverter};
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::upload::UploadStore;

pub use response::{ApiError, Envelope};

/// Multipart framing allowance on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Upper bound for `limit` on contract listings.
pub const MAX_PAGE_SIZE: usize = 200;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    /// Database, locked per operation and never across `.await`.
    pub storage: Arc<Mutex<Storage>>,
    /// Uploaded file store.
    pub uploads: Arc<UploadStore>,
    /// Markdown converter.
    pub converter: Arc<dyn DocumentConverter>,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("uploads", &self.uploads)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from already constructed parts.
    pub fn new(
        storage: Storage,
        uploads: UploadStore,
        converter: Arc<dyn DocumentConverter>,
        config: Config,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            uploads: Arc::new(uploads),
            converter,
            config: Arc::new(config),
        }
    }

    /// Open the database, upload store and converter described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the converter
    /// client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        let uploads = UploadStore::from_config(&config);

        let converter: Arc<dyn DocumentConverter> = match &config.converter.backend_url {
            Some(url) => {
                info!(backend = %url, "Using remote document converter");
                Arc::new(RemoteConverter::new(url, config.converter_timeout())?)
            }
            None => {
                info!("No conversion backend configured, only text files will be converted");
                Arc::new(TextOnlyConverter)
            }
        };

        Ok(Self::new(storage, uploads, converter, config))
    }

    /// Run `f` with the storage locked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the lock is poisoned, or whatever `f`
    /// returns.
    pub fn with_storage<T>(&self, f: impl FnOnce(&Storage) -> Result<T>) -> Result<T> {
        let storage = self
            .storage
            .lock()
            .map_err(|_| Error::internal("storage lock poisoned"))?;
        f(&storage)
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .upload
        .max_file_size
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(contracts::routes())
        .merge(rules::routes())
        .fallback(response::fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::error_detail_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware::request_tracing_middleware,
        ))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the state cannot be built, the address cannot be
/// bound, or the server fails.
pub async fn serve(config: Config) -> Result<()> {
    let address = config.bind_address();
    let state = AppState::from_config(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "Contract review API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Contract Review API 服务正在运行" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
