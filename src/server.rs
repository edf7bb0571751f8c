//! HTTP surface of the execution service.
//!
//! `POST /execute` takes `{code, language}` and answers `{output}` or
//! `{error, stage}`. Build and run failures are still `200`; only an
//! unsupported language (`400`) or a broken workspace (`500`) change the
//! status.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::dispatcher::Dispatcher;
use crate::error::{ExecError, Stage};
use crate::language::Language;
use crate::runner::ExecutionResult;

/// Anything that can turn `(language, code)` into an execution outcome.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, ExecError>;
}

#[async_trait]
impl Executor for Dispatcher {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, ExecError> {
        Self::execute(self, language, code).await
    }
}

/// Body of `POST /execute`.
///
/// Missing fields default to empty strings, so a request without a
/// `language` is rejected as unsupported rather than as malformed JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
}

/// Response body of `POST /execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Output {
        output: String,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
    },
}

impl From<Result<ExecutionResult, ExecError>> for ExecuteResponse {
    fn from(outcome: Result<ExecutionResult, ExecError>) -> Self {
        match outcome {
            Ok(result) => Self::Output {
                output: result.output().to_string(),
            },
            Err(e) => Self::Error {
                stage: e.stage(),
                error: e.to_string(),
            },
        }
    }
}

/// HTTP server wrapping an [`Executor`].
pub struct ExecutionServer<E> {
    executor: Arc<E>,
}

impl<E> Clone for ExecutionServer<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<E: Executor> ExecutionServer<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// Build the router with CORS and request tracing.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/execute", post(execute::<E>))
            .route("/health", get(health))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
            // The editor is served from a different origin.
            .layer(CorsLayer::permissive())
    }

    /// Bind `addr` and serve until Ctrl-C.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;

        info!(addr = %addr, "Code execution server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("Code execution server stopped");
        Ok(())
    }
}

async fn execute<E: Executor>(
    State(server): State<ExecutionServer<E>>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let outcome = server
        .executor
        .execute(&request.language, &request.code)
        .await;

    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            if matches!(e, ExecError::Workspace(_)) {
                error!(error = %e, "Execution could not start");
            }
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    (status, Json(outcome.into()))
}

async fn health() -> Json<serde_json::Value> {
    let languages: Vec<&str> = Language::SERVER_SIDE.iter().map(|l| l.as_str()).collect();
    Json(json!({ "status": "ok", "languages": languages }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
