//! # Web Form Server Module
//!
//! Accepts order form submissions on `POST /submit` and serves the static
//! form pages for everything else. Submissions go through the same
//! ingestion pipeline as exported files.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use teloxide::utils::html::escape;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ingestion::{OrderIngestionPipeline, RawPayload};
use crate::intake_errors::{IntakeError, IntakeResult};

pub const FORM_PAGE: &str = "form.html";
pub const SUCCESS_PAGE: &str = "success.html";

/// Shown to the form caller when an order cannot be processed
pub const ORDER_FAILED_MESSAGE: &str = "Ошибка обработки заказа. Попробуйте еще раз позже.";

const FALLBACK_SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Заказ принят</title></head>
<body>
    <h1>Спасибо! Ваш заказ принят.</h1>
    <p>Менеджер свяжется с вами в ближайшее время.</p>
    <a href="/">Оформить еще один заказ</a>
</body>
</html>"#;

#[derive(Clone)]
struct WebState {
    pipeline: Arc<OrderIngestionPipeline>,
    pages_dir: Arc<PathBuf>,
}

/// Build the order form router
pub fn router(pipeline: Arc<OrderIngestionPipeline>, pages_dir: impl Into<PathBuf>) -> Router {
    let state = WebState {
        pipeline,
        pages_dir: Arc::new(pages_dir.into()),
    };

    Router::new()
        .route("/submit", post(submit_order).fallback(serve_form))
        .fallback(serve_form)
        .with_state(state)
}

/// Warn about missing pages; the server still starts without them
pub fn check_pages(pages_dir: &Path) {
    if !pages_dir.join(FORM_PAGE).is_file() {
        warn!(dir = %pages_dir.display(), "{FORM_PAGE} not found, the form will answer with an error page");
    }
    if !pages_dir.join(SUCCESS_PAGE).is_file() {
        warn!(dir = %pages_dir.display(), "{SUCCESS_PAGE} not found, the built-in success page will be used");
    }
}

fn error_page(message: &str) -> Response {
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Ошибка</title></head>
<body>
    <h1>Ошибка</h1>
    <p>{}</p>
    <button onclick="window.history.back()">Назад</button>
</body>
</html>"#,
        escape(message)
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Html(body)).into_response()
}

async fn read_page(pages_dir: &Path, name: &str) -> std::io::Result<String> {
    tokio::fs::read_to_string(pages_dir.join(name)).await
}

async fn serve_form(State(state): State<WebState>) -> Response {
    match read_page(&state.pages_dir, FORM_PAGE).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to read {FORM_PAGE}");
            error_page(&format!("HTML файл {FORM_PAGE} не найден"))
        }
    }
}

async fn submit_order(State(state): State<WebState>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body).into_owned();
    let pipeline = state.pipeline.clone();

    let result =
        tokio::task::spawn_blocking(move || pipeline.ingest(RawPayload::FormBody(body))).await;

    match result {
        Ok(Ok(order_id)) => {
            info!(order_id, "Order form submitted");
            match read_page(&state.pages_dir, SUCCESS_PAGE).await {
                Ok(page) => Html(page).into_response(),
                Err(_) => Html(FALLBACK_SUCCESS_PAGE).into_response(),
            }
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to process order form");
            error_page(ORDER_FAILED_MESSAGE)
        }
        Err(e) => {
            error!(error = %e, "Order form task failed");
            error_page("Внутренняя ошибка сервера")
        }
    }
}

/// A running order form server
pub struct WebServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl WebServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests to finish
    pub async fn stop(self) -> Result<()> {
        // The server may already be gone; waiting on the task reports why
        let _ = self.shutdown.send(());
        self.task.await??;
        info!(addr = %self.local_addr, "Web server stopped");
        Ok(())
    }
}

/// Bind `addr` and serve the order form in the background
pub async fn start(
    addr: SocketAddr,
    pages_dir: impl Into<PathBuf>,
    pipeline: Arc<OrderIngestionPipeline>,
) -> IntakeResult<WebServerHandle> {
    let pages_dir = pages_dir.into();
    check_pages(&pages_dir);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IntakeError::Transport(format!("failed to bind {addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| IntakeError::Transport(e.to_string()))?;

    let app = router(pipeline, pages_dir);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    info!(addr = %local_addr, "Order form server listening");
    Ok(WebServerHandle {
        local_addr,
        shutdown,
        task,
    })
}
