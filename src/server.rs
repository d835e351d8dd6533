//! Development server: renders routed URLs live, serves the rest from disk.
//!
//! ```text
//! GET /path ─▶ Engine::render (blocking pool)
//!               ├─ Rendered    → 200, content type from the URL extension
//!               ├─ Loading     → 503 + Retry-After, placeholder body
//!               └─ NotHandled  → ServeDir(build_root) → file or 404
//! ```
//!
//! Static outputs are never rendered here; the processors have already
//! written them to the build root and `ServeDir` picks them up.

use crate::engine::{Engine, RenderOutcome};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Seconds a client should wait before retrying during a rebuild.
const RETRY_AFTER_SECS: &str = "2";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content type for a rendered URL, from its last segment's extension.
///
/// URLs ending in `/` or without an extension are HTML.
pub fn content_type_for(url: &str) -> &'static str {
    let last = url.rsplit('/').next().unwrap_or_default();
    let ext = match last.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "text/html; charset=utf-8",
    };
    match ext.as_str() {
        "xml" | "rss" | "atom" => "application/xml",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "svg" => "image/svg+xml",
        _ => "text/html; charset=utf-8",
    }
}

/// Response for a finished render, or `None` when the request should fall through.
pub fn render_response(url: &str, outcome: RenderOutcome, body: Vec<u8>) -> Option<Response> {
    match outcome {
        RenderOutcome::Rendered { .. } => Some(
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type_for(url))],
                body,
            )
                .into_response(),
        ),
        RenderOutcome::Loading => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            Some(response)
        }
        RenderOutcome::NotHandled => None,
    }
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new().fallback(handle).with_state(engine)
}

async fn handle(State(engine): State<Arc<Engine>>, request: Request) -> Response {
    let url = request.uri().path().to_string();

    let render_engine = engine.clone();
    let render_url = url.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let mut body = Vec::new();
        render_engine
            .render(&render_url, &mut body)
            .map(|outcome| (outcome, body))
    })
    .await;

    match rendered {
        Ok(Ok((outcome, body))) => match render_response(&url, outcome, body) {
            Some(response) => response,
            None => serve_static(&engine, request).await,
        },
        Ok(Err(e)) => {
            log::warn!("{}: render failed: {}", url, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            log::error!("{}: render task failed: {}", url, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn serve_static(engine: &Engine, request: Request) -> Response {
    let service = ServeDir::new(&engine.settings().build_root);
    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

/// Bind `host:port` and serve until ctrl-c.
pub async fn run(engine: Arc<Engine>, host: &str, port: u16) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("serving at http://{}", listener.local_addr()?);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineBuilder, EngineSettings, LOADING_PLACEHOLDER};
    use crate::routes::RouteCaptures;
    use crate::test_helpers::{RecordingController, StubLoader, write_file};
    use tempfile::TempDir;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("/"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/blog/post/"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/about"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/feed.xml"), "application/xml");
        assert_eq!(content_type_for("/data/INDEX.JSON"), "application/json");
        assert_eq!(content_type_for("/page.html"), "text/html; charset=utf-8");
    }

    #[test]
    fn loading_is_unavailable_with_retry() {
        let response = render_response(
            "/a/",
            RenderOutcome::Loading,
            LOADING_PLACEHOLDER.as_bytes().to_vec(),
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn rendered_is_ok_and_not_handled_falls_through() {
        let outcome = RenderOutcome::Rendered {
            target: "a.md".into(),
            captures: RouteCaptures::default(),
        };
        let response = render_response("/feed.xml", outcome, b"<rss/>".to_vec()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");

        assert!(render_response("/x/", RenderOutcome::NotHandled, Vec::new()).is_none());
    }

    fn engine(tmp: &TempDir) -> Arc<Engine> {
        let content = tmp.path().join("content");
        write_file(&content, "a.md", "<p>a</p>");
        write_file(&tmp.path().join("dist"), "style.css", "body {}");
        let mut builder =
            EngineBuilder::new(EngineSettings::new(&content, tmp.path().join("dist")));
        builder
            .register_content(
                r"\.md$",
                "page",
                Arc::new(StubLoader),
                Arc::new(RecordingController::new(&["/{stem}/"])),
            )
            .unwrap();
        let engine = builder.build();
        engine.prepare().unwrap();
        Arc::new(engine)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn routed_url_is_rendered() {
        let tmp = TempDir::new().unwrap();
        let app = router(engine(&tmp));
        assert_eq!(get(app, "/a/").await, (StatusCode::OK, "<p>a</p>".to_string()));
    }

    #[tokio::test]
    async fn unrouted_url_falls_through_to_build_root() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp);
        assert_eq!(
            get(router(engine.clone()), "/style.css").await,
            (StatusCode::OK, "body {}".to_string())
        );
        assert_eq!(get(router(engine), "/missing.png").await.0, StatusCode::NOT_FOUND);
    }
}
