use crate::config::{AuthConfig, StreamConfig};
use crate::encoder::{EncodedPayload, FramePublisher};
use crate::error::{Result, StreamError};
use crate::health::HealthStatus;
use crate::viewers::ViewerTracker;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tower_http::validate_request::ValidateRequestHeaderLayer;
use tracing::{debug, info, trace, warn};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct ServerState {
    pub publisher: FramePublisher,
    pub viewers: ViewerTracker,
    pub motion_rx: watch::Receiver<bool>,
    pub health_rx: watch::Receiver<HealthStatus>,
    pub started_at: DateTime<Utc>,
}

/// HTTP delivery layer: serves the live MJPEG feed, the motion alert
/// flag, and a health report. The stream routes sit behind basic
/// authentication when credentials are configured.
pub struct StreamServer {
    config: StreamConfig,
    auth: AuthConfig,
    state: ServerState,
}

impl StreamServer {
    pub fn new(config: StreamConfig, auth: AuthConfig, state: ServerState) -> Self {
        Self {
            config,
            auth,
            state,
        }
    }

    fn router(&self) -> Router {
        let mut protected = Router::new()
            .route("/", get(stream_page_handler))
            .route("/stream.mjpg", get(mjpeg_stream_handler));

        match (&self.auth.username, &self.auth.password) {
            (Some(username), Some(password)) => {
                protected =
                    protected.route_layer(ValidateRequestHeaderLayer::basic(username, password));
            }
            _ => {
                warn!("No stream credentials configured; stream endpoints are unauthenticated");
            }
        }

        Router::new()
            .merge(protected)
            .route("/motion_alerts", get(motion_alerts_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until shutdown is requested.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("MJPEG server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StreamError::Serve {
                details: e.to_string(),
            })?;

        info!("MJPEG server stopped");
        Ok(())
    }
}

/// Multipart boundary and headers preceding one JPEG payload.
fn multipart_header(payload: &EncodedPayload) -> String {
    format!(
        "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-ID: {}\r\nX-Timestamp: {}\r\n\r\n",
        payload.data.len(),
        payload.frame_id,
        payload
            .timestamp
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
    )
}

/// Handler for the MJPEG streaming endpoint.
///
/// Registers the viewer (which pulls capture into active mode on the next
/// coordinator tick) and relays encoded payloads from the live sequence.
/// The viewer joins at the current point: payloads published before the
/// connection are never replayed, and a slow client silently skips the
/// frames it lagged past.
async fn mjpeg_stream_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let viewer = state.viewers.attach();
    let mut rx = state.publisher.subscribe();

    let stream = async_stream::stream! {
        let viewer = viewer;
        let mut frames_streamed = 0u64;

        loop {
            match rx.recv().await {
                Ok(payload) => {
                    frames_streamed += 1;
                    trace!(
                        "Streaming frame {} to viewer {} ({} bytes)",
                        payload.frame_id,
                        viewer.id(),
                        payload.data.len()
                    );

                    yield Ok::<_, axum::Error>(Bytes::from(multipart_header(&payload)));
                    yield Ok(payload.data);
                    yield Ok(Bytes::from("\r\n"));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!("Viewer {} lagged, skipped {} frames", viewer.id(), missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!(
                        "Payload sequence ended for viewer {} after {} frames",
                        viewer.id(),
                        frames_streamed
                    );
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=FRAME",
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(axum::body::Body::from_stream(stream))
        .unwrap()
}

/// Plain-text motion flag, refreshed by the coordinator each idle tick.
async fn motion_alerts_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let motion = *state.motion_rx.borrow();
    let body = if motion { "motion" } else { "nomotion" };
    ([(header::CONTENT_TYPE, "text/plain")], body)
}

/// JSON health report for supervision and monitoring.
async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let status = *state.health_rx.borrow();
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();

    let report = serde_json::json!({
        "status": status,
        "started_at": state.started_at.to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "viewer_streams": state.publisher.viewer_streams(),
    });

    (StatusCode::OK, axum::Json(report))
}

/// Minimal HTML page embedding the live stream.
async fn stream_page_handler() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Wakecam</title>
    <style>
        body { margin: 0; background: #000; display: flex; align-items: center; justify-content: center; min-height: 100vh; }
        img.stream { max-width: 100vw; max-height: 100vh; object-fit: contain; }
    </style>
</head>
<body>
    <img class="stream" src="/stream.mjpg" alt="Live camera stream">
</body>
</html>
"#,
    )
}
