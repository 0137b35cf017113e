use crate::config::Config;
use crate::error::ScanError;
use crate::pipeline::{Stage, StepTiming};
use crate::processor::ScanProcessor;
use crate::storage::OutputStore;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ScanProcessor>,
    pub config: Arc<Config>,
}

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub final_images: Vec<String>,
    pub request_id: String,
    pub processing_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub stages: Vec<String>,
    pub output_format: String,
    pub max_file_size_bytes: usize,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let processor = ScanProcessor::new(&config)?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        processor: Arc::new(processor),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/images/:filename", get(handle_image))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        // Multipart framing adds a little on top of the file itself
        .layer(DefaultBodyLimit::max(max_file_size + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a multipart failure, keeping body-limit hits distinct from malformed input
fn multipart_error(e: MultipartError, context: &str, max_file_size: usize) -> ScanError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!("Upload rejected by body limit: {}", e);
        return ScanError::UploadTooLarge { max: max_file_size };
    }
    ScanError::InvalidRequest(format!("{}: {}", context, e))
}

/// Handle upload-and-process requests
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ScanError> {
    let mut file: Option<(String, Bytes)> = None;

    let max_file_size = state.config.max_file_size;

    // Parse multipart form. The first `file` part wins.
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to parse multipart", max_file_size))?
    {
        if field.name() != Some("file") || file.is_some() {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, "Failed to read file data", max_file_size))?;
        file = Some((filename, data));
    }

    let (filename, data) = file.ok_or(ScanError::MissingFilePart)?;
    if filename.is_empty() {
        return Err(ScanError::EmptyFilename);
    }

    if data.len() > max_file_size {
        return Err(ScanError::ImageTooLarge {
            size: data.len(),
            max: max_file_size,
        });
    }

    tracing::info!("Received upload {} ({} bytes)", filename, data.len());

    let processor = state.processor.clone();
    let result = tokio::task::spawn_blocking(move || processor.process_upload(&filename, &data))
        .await
        .map_err(|e| ScanError::Internal(format!("Processing task failed: {}", e)))??;

    tracing::info!(
        "Request {} processed in {}ms",
        result.request_id,
        result.processing_time_ms
    );

    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully.".to_string(),
        final_images: result.final_images,
        request_id: result.request_id,
        processing_time_ms: result.processing_time_ms,
        steps: result.steps,
    }))
}

/// Serve a processed output by filename
async fn handle_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ScanError> {
    let path = state.processor.store().resolve(&filename)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ScanError::NotFound),
        Err(e) => {
            return Err(ScanError::Internal(format!(
                "Failed to read {}: {}",
                filename, e
            )))
        }
    };

    Ok((
        [(header::CONTENT_TYPE, OutputStore::content_type_for(&filename))],
        bytes,
    )
        .into_response())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        stages: Stage::ALL.iter().map(|s| s.name().to_string()).collect(),
        output_format: state.processor.store().format().extension().to_string(),
        max_file_size_bytes: state.config.max_file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OutputFormat;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "scanmaster-test-boundary";

    struct TestApp {
        app: Router,
        _root: tempfile::TempDir,
        output_dir: std::path::PathBuf,
    }

    fn test_app(max_file_size: usize) -> TestApp {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_file_size,
            upload_dir: root.path().join("uploads"),
            output_dir: root.path().join("processed"),
            output_format: OutputFormat::Jpeg,
            jpeg_quality: 95,
        };
        let output_dir = config.output_dir.clone();
        let state = AppState {
            processor: Arc::new(ScanProcessor::new(&config).unwrap()),
            config: Arc::new(config),
        };
        TestApp {
            app: router(state),
            _root: root,
            output_dir,
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    /// Build a multipart body holding one part
    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        multipart_parts(&[(field, filename, data)])
    }

    fn multipart_parts(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, field, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn fetch(app: &Router, uri: &str) -> (StatusCode, Bytes) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    fn json(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let t = test_app(1024 * 1024);
        let (status, body) = fetch(&t.app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_lists_stages_in_order() {
        let t = test_app(1024 * 1024);
        let (status, body) = fetch(&t.app, "/info").await;

        assert_eq!(status, StatusCode::OK);
        let info = json(&body);
        assert_eq!(info["stages"][0], "gray_image");
        assert_eq!(info["stages"][5], "result");
        assert_eq!(info["output_format"], "jpg");
        assert_eq!(info["max_file_size_bytes"], 1024 * 1024);
    }

    #[tokio::test]
    async fn test_upload_without_file_part() {
        let t = test_app(1024 * 1024);
        let body = multipart_body("document", "scan.png", &sample_png());
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["message"], "No file part");
    }

    #[tokio::test]
    async fn test_upload_with_empty_filename() {
        let t = test_app(1024 * 1024);
        let body = multipart_body("file", "", b"");
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["message"], "No selected file");
    }

    #[tokio::test]
    async fn test_upload_non_image_fails_with_decode_error() {
        let t = test_app(1024 * 1024);
        let body = multipart_body("file", "notes.txt", b"just some text");
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["code"], "DECODE_ERROR");
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let t = test_app(64);
        let body = multipart_body("file", "scan.png", &[0u8; 1024]);
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json(&body)["code"], "IMAGE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_upload_far_over_body_limit() {
        // Well past the multipart slack, so the body limit trips first
        let t = test_app(64);
        let body = multipart_body("file", "scan.png", &vec![0u8; 200 * 1024]);
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json(&body)["code"], "IMAGE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_upload_uses_first_file_part() {
        let t = test_app(1024 * 1024);
        let png = sample_png();
        let body = multipart_parts(&[
            ("file", "a.png", png.as_slice()),
            ("file", "", b"".as_slice()),
        ]);
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["final_images"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_upload_then_fetch_every_output() {
        let t = test_app(1024 * 1024);
        let body = multipart_body("file", "scan.png", &sample_png());
        let (status, body) = send(&t.app, upload_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        let response = json(&body);
        assert_eq!(
            response["message"],
            "File uploaded and processed successfully."
        );

        let names: Vec<String> = response["final_images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), 6);
        assert!(names[0].ends_with("_gray_image.jpg"));
        assert!(names[5].ends_with("_result.jpg"));

        for name in &names {
            let (status, bytes) = fetch(&t.app, &format!("/images/{}", name)).await;
            assert_eq!(status, StatusCode::OK, "{}", name);
            let on_disk = std::fs::read(t.output_dir.join(name)).unwrap();
            assert_eq!(bytes.as_ref(), on_disk.as_slice());
        }
    }

    #[tokio::test]
    async fn test_fetch_sets_content_type() {
        let t = test_app(1024 * 1024);
        let body = multipart_body("file", "scan.png", &sample_png());
        let (_, body) = send(&t.app, upload_request(body)).await;
        let name = json(&body)["final_images"][5].as_str().unwrap().to_string();

        let response = t
            .app
            .clone()
            .oneshot(
                Request::get(format!("/images/{}", name))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let t = test_app(1024 * 1024);
        let (status, body) = fetch(&t.app, "/images/does_not_exist.jpg").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["message"], "File not found");
    }

    #[tokio::test]
    async fn test_fetch_rejects_traversal() {
        let t = test_app(1024 * 1024);
        let (status, body) = fetch(&t.app, "/images/..%2Fuploads").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["message"], "File not found");
    }
}
