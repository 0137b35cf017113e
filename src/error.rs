use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No file part")]
    MissingFilePart,

    #[error("No selected file")]
    EmptyFilename,

    #[error("Error saving file: {0}")]
    StorageWriteError(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Invalid channel layout: expected {expected} channels, found {found}")]
    InvalidChannelLayout { expected: u8, found: u8 },

    #[error("Stage {stage} failed: {message}")]
    StageError {
        stage: &'static str,
        message: String,
    },

    #[error("Failed to write {stage}: {message}")]
    EncodeError {
        stage: &'static str,
        message: String,
    },

    #[error("File not found")]
    NotFound,

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Upload exceeds the size limit (max: {max} bytes)")]
    UploadTooLarge { max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ScanError::MissingFilePart => (StatusCode::BAD_REQUEST, "MISSING_FILE_PART"),
            ScanError::EmptyFilename => (StatusCode::BAD_REQUEST, "EMPTY_FILENAME"),
            ScanError::StorageWriteError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_WRITE_ERROR")
            }
            ScanError::DecodeError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DECODE_ERROR"),
            ScanError::InvalidChannelLayout { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_CHANNEL_LAYOUT")
            }
            ScanError::StageError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STAGE_ERROR"),
            ScanError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
            ScanError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ScanError::ImageTooLarge { .. } | ScanError::UploadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE")
            }
            ScanError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ScanError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            message: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
