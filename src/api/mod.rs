use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    LocmapError,
    map::{self, RenderContext},
    pipeline::{BatchOutput, BatchSummary, NoProgress, Pipeline},
    scenario::Scenario,
    table::{self, Table},
    templates,
};

const MAX_DOT_SIZE: u32 = 50;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub render: RenderContext,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_columns: Vec<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
            missing_columns: Vec::new(),
        }
    }

    fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.to_string())
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl From<LocmapError> for ApiError {
    fn from(err: LocmapError) -> Self {
        match err {
            LocmapError::MissingColumns { ref columns, .. } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                missing_columns: columns.clone(),
                error: err.to_string(),
            },
            LocmapError::Validation { .. } => Self::bad_request(err.user_message()),
            LocmapError::Api { .. } => Self::new(StatusCode::BAD_GATEWAY, err.user_message()),
            other => Self::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ScenarioInfo {
    slug: &'static str,
    name: &'static str,
    required_columns: Vec<&'static str>,
    result_columns: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub scenario: Scenario,
    pub rows: usize,
    pub resolved: usize,
    pub summary: BatchSummary,
    pub map_html: String,
    pub csv: String,
    pub export_filename: String,
}

/// Fields of the upload form
struct Upload {
    scenario: Scenario,
    filename: String,
    bytes: Vec<u8>,
    dot_size: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scenarios", get(list_scenarios))
        .route("/templates", get(download_templates))
        .route("/process", post(process))
        .route("/export", post(export))
}

async fn list_scenarios() -> Json<Vec<ScenarioInfo>> {
    Json(
        Scenario::ALL
            .into_iter()
            .map(|scenario| ScenarioInfo {
                slug: scenario.slug(),
                name: scenario.display_name(),
                required_columns: scenario.required_columns(),
                result_columns: scenario.result_columns(),
            })
            .collect(),
    )
}

async fn download_templates() -> Result<impl IntoResponse, ApiError> {
    let bundle = templates::template_bundle().map_err(ApiError::internal)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", templates::BUNDLE_FILENAME),
            ),
        ],
        bundle,
    ))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut scenario = None;
    let mut file = None;
    let mut dot_size = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::bad_request)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "scenario" => {
                let text = field.text().await.map_err(ApiError::bad_request)?;
                scenario = Some(text.parse::<Scenario>()?);
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field.bytes().await.map_err(ApiError::bad_request)?;
                file = Some((filename, bytes.to_vec()));
            }
            "dot_size" => {
                let text = field.text().await.map_err(ApiError::bad_request)?;
                let text = text.trim();
                if !text.is_empty() {
                    let size: u32 = text
                        .parse()
                        .map_err(|_| ApiError::bad_request(format!("Invalid dot_size '{text}'")))?;
                    if size == 0 || size > MAX_DOT_SIZE {
                        return Err(ApiError::bad_request(format!(
                            "dot_size must be between 1 and {MAX_DOT_SIZE}"
                        )));
                    }
                    dot_size = Some(size);
                }
            }
            _ => {}
        }
    }

    let scenario = scenario.ok_or_else(|| ApiError::bad_request("Missing field 'scenario'"))?;
    let (filename, bytes) = file.ok_or_else(|| ApiError::bad_request("Missing field 'file'"))?;

    Ok(Upload {
        scenario,
        filename,
        bytes,
        dot_size,
    })
}

async fn run_upload(state: &AppState, upload: &Upload) -> Result<(BatchOutput, Vec<u8>), ApiError> {
    let table = Table::from_bytes(&upload.bytes).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    info!(
        "Processing upload '{}' ({} rows) as {}",
        upload.filename,
        table.len(),
        upload.scenario
    );

    let output = state
        .pipeline
        .run(&table, upload.scenario, &NoProgress)
        .await?;
    let csv = table::export_csv(&output.headers, &output.records, output.scenario)
        .map_err(ApiError::internal)?;
    Ok((output, csv))
}

fn export_name(upload: &Upload) -> String {
    table::export_filename(&upload.filename, chrono::Local::now().date_naive())
}

async fn process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let (output, csv) = run_upload(&state, &upload).await?;

    let ctx = match upload.dot_size {
        Some(size) => state.render.clone().with_dot_size(size),
        None => state.render.clone(),
    };
    let map_html =
        map::render_map(output.scenario, &output.records, &ctx).map_err(ApiError::internal)?;
    let csv = String::from_utf8(csv).map_err(ApiError::internal)?;

    Ok(Json(ProcessResponse {
        scenario: output.scenario,
        rows: output.summary.rows,
        resolved: output.summary.resolved,
        summary: output.summary,
        map_html,
        csv,
        export_filename: export_name(&upload),
    }))
}

async fn export(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(multipart).await?;
    let (_, csv) = run_upload(&state, &upload).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export_name(&upload)),
            ),
        ],
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceRounding;
    use crate::geocoding::{Address, GeocodeHit, Geocoder};
    use crate::location_resolver::LocationResolver;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "locmap-test-boundary";

    struct ParisGeocoder;

    #[async_trait]
    impl Geocoder for ParisGeocoder {
        async fn geocode(&self, query: &str) -> crate::Result<Option<GeocodeHit>> {
            Ok(query.ends_with("FR").then(|| GeocodeHit {
                latitude: 48.8566,
                longitude: 2.3522,
                address: [("country_code", "fr")].into_iter().collect(),
            }))
        }

        async fn reverse_geocode(&self, _: f64, _: f64) -> crate::Result<Option<Address>> {
            Ok(None)
        }
    }

    fn app() -> Router {
        let resolver = LocationResolver::new(Arc::new(ParisGeocoder));
        router().with_state(AppState {
            pipeline: Pipeline::new(resolver, DistanceRounding::Float),
            render: RenderContext::default(),
        })
    }

    fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, value) in fields {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/process")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_scenarios() {
        let response = app()
            .oneshot(Request::get("/scenarios").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json.as_array().unwrap().len(), 4);
        assert_eq!(json[1]["slug"], "supply-chain");
        assert_eq!(json[3]["required_columns"][3], "volume");
    }

    #[tokio::test]
    async fn test_process_upload() {
        let request = multipart(&[
            ("scenario", None, "standard"),
            (
                "file",
                Some("sites.csv"),
                "country_code,postal_code,city,layer\nFR,75001,Paris,1\nUS,,Boston,2\n",
            ),
            ("dot_size", None, "5"),
        ]);

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["scenario"], "standard");
        assert_eq!(json["rows"], 2);
        assert_eq!(json["resolved"], 1);
        assert!(
            json["csv"]
                .as_str()
                .unwrap()
                .contains("FR,75001,Paris,1,48.8566,2.3522")
        );
        assert!(json["map_html"].as_str().unwrap().contains("\"radius\":5.0"));
        assert!(
            json["export_filename"]
                .as_str()
                .unwrap()
                .starts_with("sites_geocoding_details_")
        );
    }

    #[tokio::test]
    async fn test_missing_columns_is_unprocessable() {
        let request = multipart(&[
            ("scenario", None, "volume"),
            ("file", Some("v.csv"), "country_code,city\nFR,Paris\n"),
        ]);

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(
            json["missing_columns"],
            serde_json::json!(["postal_code", "volume"])
        );
    }

    #[tokio::test]
    async fn test_unknown_scenario_is_bad_request() {
        let request = multipart(&[
            ("scenario", None, "heatmap"),
            ("file", Some("v.csv"), "country_code\nFR\n"),
        ]);

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let request = multipart(&[("scenario", None, "standard")]);

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing field 'file'");
    }

    #[tokio::test]
    async fn test_templates_download() {
        let response = app()
            .oneshot(Request::get("/templates").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
    }
}
