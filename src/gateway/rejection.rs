//! Rejections and their HTTP rendering.

use super::headers::UploadHeaders;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Which required headers were absent, keyed by header name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MissingHeaders {
    /// `x-upload-signed-message` absent.
    #[serde(rename = "x-upload-signed-message")]
    pub signed_message: bool,
    /// `x-uploader-address` absent.
    #[serde(rename = "x-uploader-address")]
    pub uploader_address: bool,
    /// `x-file-name` absent.
    #[serde(rename = "x-file-name")]
    pub file_name: bool,
    /// `swarm-postage-batch-id` absent.
    #[serde(rename = "swarm-postage-batch-id")]
    pub batch_id: bool,
}

impl MissingHeaders {
    /// Required headers absent from `upload`.
    #[must_use]
    pub fn of(upload: &UploadHeaders) -> Self {
        Self {
            signed_message: upload.signed_message.is_none(),
            uploader_address: upload.uploader_address.is_none(),
            file_name: upload.file_name.is_none(),
            batch_id: upload.batch_id.is_none(),
        }
    }
}

/// Why an upload was not forwarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Required headers absent and no usable session.
    #[error("Missing required headers")]
    MissingHeaders(MissingHeaders),

    /// Signature does not verify for the uploader and message.
    #[error("Invalid signature")]
    InvalidSignature {
        /// Address the caller claimed.
        provided: String,
        /// Address the signature actually recovers to, when known.
        recovered: Option<String>,
    },

    /// Signature is fine but the uploader did not pay for the batch.
    #[error("Not authorized for this batch")]
    NotBatchPayer {
        /// Payer recorded in the registry.
        batch_payer: String,
        /// Address the caller claimed.
        uploader: String,
    },

    /// The registry has no payer for the batch.
    #[error("Batch not found")]
    BatchNotFound {
        /// Batch that was looked up.
        batch_id: String,
    },

    /// The registry could not be read.
    #[error("Failed to verify batch ownership")]
    VerifierUnavailable {
        /// Underlying failure.
        details: String,
    },

    /// Any other failure on the verification path.
    #[error("Signature verification failed")]
    VerificationFailed {
        /// Underlying failure.
        details: String,
    },
}

impl Rejection {
    /// HTTP status for this rejection.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeaders(_)
            | Self::InvalidSignature { .. }
            | Self::VerificationFailed { .. } => StatusCode::UNAUTHORIZED,
            Self::NotBatchPayer { .. } | Self::BatchNotFound { .. } => StatusCode::FORBIDDEN,
            Self::VerifierUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for this rejection.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let error = self.to_string();
        match self {
            Self::MissingHeaders(missing) => json!({ "error": error, "missing": missing }),
            Self::InvalidSignature {
                provided,
                recovered: Some(recovered),
            } => json!({ "error": error, "provided": provided, "recovered": recovered }),
            Self::InvalidSignature {
                provided,
                recovered: None,
            } => json!({ "error": error, "provided": provided }),
            Self::NotBatchPayer {
                batch_payer,
                uploader,
            } => json!({ "error": error, "batchPayer": batch_payer, "uploader": uploader }),
            Self::BatchNotFound { batch_id } => json!({ "error": error, "batchId": batch_id }),
            Self::VerifierUnavailable { details } | Self::VerificationFailed { details } => {
                json!({ "error": error, "details": details })
            }
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
