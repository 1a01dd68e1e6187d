use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, response::Html, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState};
use crate::config::WebConfig;

// a full batch is paced by the geocoder's rate limit
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>locmap</title>
<style>
body { font: 14px sans-serif; margin: 0; display: flex; height: 100vh; }
form { width: 280px; padding: 16px; box-sizing: border-box; border-right: 1px solid #ddd; }
label { display: block; margin-top: 12px; }
iframe { flex: 1; border: 0; }
</style>
</head>
<body>
<form id="upload">
  <h2>locmap</h2>
  <label>Scenario
    <select name="scenario">
      <option value="standard">Standard visualization</option>
      <option value="supply-chain">Supply-chain visualization</option>
      <option value="distance">Distance calculation</option>
      <option value="volume">Volume visualization</option>
    </select>
  </label>
  <label>File <input type="file" name="file" accept=".csv" required></label>
  <label>Dot size <input type="number" name="dot_size" min="1" max="50" value="2"></label>
  <p><button type="submit">Create</button></p>
  <p id="status"></p>
  <p><a id="download" hidden>Download raw data</a></p>
  <p><a href="/api/templates">Download templates</a></p>
</form>
<iframe id="map"></iframe>
<script>
document.getElementById('upload').addEventListener('submit', async (event) => {
  event.preventDefault();
  const status = document.getElementById('status');
  status.textContent = 'Processing...';
  const response = await fetch('/api/process', { method: 'POST', body: new FormData(event.target) });
  const body = await response.json();
  if (!response.ok) {
    status.textContent = body.error;
    return;
  }
  status.textContent = `${body.resolved} locations resolved from ${body.rows} rows`;
  document.getElementById('map').srcdoc = body.map_html;
  const link = document.getElementById('download');
  link.href = URL.createObjectURL(new Blob([body.csv], { type: 'text/csv' }));
  link.download = body.export_filename;
  link.hidden = false;
});
</script>
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Full application router with middleware applied
pub fn app(state: AppState, config: &WebConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = config.max_upload_mb as usize * 1024 * 1024;

    Router::new()
        .route("/", get(index))
        .nest("/api", api::router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: AppState, config: &WebConfig) -> Result<()> {
    let app = app(state, config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Web server running at http://localhost:{}", config.port);
    axum::serve(listener, app)
        .await
        .context("Web server stopped unexpectedly")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceRounding;
    use crate::geocoding::{Address, GeocodeHit, Geocoder};
    use crate::location_resolver::LocationResolver;
    use crate::map::RenderContext;
    use crate::pipeline::Pipeline;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoGeocoder;

    #[async_trait]
    impl Geocoder for NoGeocoder {
        async fn geocode(&self, _: &str) -> crate::Result<Option<GeocodeHit>> {
            Ok(None)
        }

        async fn reverse_geocode(&self, _: f64, _: f64) -> crate::Result<Option<Address>> {
            Ok(None)
        }
    }

    fn test_app(max_upload_mb: u32) -> Router {
        let state = AppState {
            pipeline: Pipeline::new(
                LocationResolver::new(Arc::new(NoGeocoder)),
                DistanceRounding::Float,
            ),
            render: RenderContext::default(),
        };
        let config = WebConfig {
            port: 0,
            max_upload_mb,
        };
        app(state, &config)
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = test_app(1)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let body = vec![b'a'; 2 * 1024 * 1024];
        let request = Request::post("/api/process")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let response = test_app(1).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let request = Request::get("/api/scenarios")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();

        let response = test_app(1).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
