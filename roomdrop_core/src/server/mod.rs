//! HTTP + WebSocket relay server.
//!
//! One axum router carries the whole surface: the `/ws` channel for rooms,
//! presence and chunk transfer, and the thin `/api` request/response layer
//! for room creation and whole-file upload/download.

pub mod http;
pub mod state;
pub mod ws;

pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Build the full router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let max_body = state.config.max_upload_bytes as usize;

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/rooms", post(http::create_room))
        .route("/api/rooms/{code}", get(http::room_info))
        .route(
            "/api/rooms/{code}/files",
            post(http::upload_file).get(http::list_files),
        )
        .route(
            "/api/files/{file_id}",
            get(http::download_file).delete(http::delete_file),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the listener fails or `cancel_token` fires.
pub async fn run_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    cancel_token: Option<CancellationToken>,
) -> Result<()> {
    let router = router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("relay server listening on http://{}", listener.local_addr()?);

    if let Some(ct) = cancel_token {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            tracing::info!("relay server shutting down gracefully");
        })
        .await?;
    } else {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn test_router() -> Router {
        router(AppState::new(ServerConfig::default()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_room_returns_a_valid_code() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/rooms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        let code = json["room_code"].as_str().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn unknown_room_info_is_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/rooms/ZZZZ99")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Room not found");
    }

    #[tokio::test]
    async fn malformed_room_code_is_400() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/rooms/bogus-code")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_without_file_field_is_400() {
        let state = AppState::new(ServerConfig::default());
        let code = state.rooms.create_room().await.unwrap();
        let router = router(state);

        let boundary = "test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"device_info\"\r\n\r\nLaptop\r\n--{boundary}--\r\n"
        );
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/rooms/{code}/files"))
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "No file provided");
    }

    #[tokio::test]
    async fn download_unknown_file_is_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/files/no-such-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
