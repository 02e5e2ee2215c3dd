//! Header names understood and produced by the gateway.

use axum::http::{HeaderMap, HeaderName};

/// Signature over the upload message.
pub const SIGNED_MESSAGE: HeaderName = HeaderName::from_static("x-upload-signed-message");
/// Claimed uploader wallet address.
pub const UPLOADER_ADDRESS: HeaderName = HeaderName::from_static("x-uploader-address");
/// Name of the uploaded file.
pub const FILE_NAME: HeaderName = HeaderName::from_static("x-file-name");
/// Postage batch to spend from.
pub const BATCH_ID: HeaderName = HeaderName::from_static("swarm-postage-batch-id");
/// Explicit signed message, otherwise `"{file}:{batch}"`.
pub const MESSAGE_CONTENT: HeaderName = HeaderName::from_static("x-message-content");
/// Token from an earlier successful verification.
pub const SESSION_TOKEN: HeaderName = HeaderName::from_static("x-upload-session-token");
/// Literal `true` requests a session on success.
pub const MULTI_FILE_UPLOAD: HeaderName = HeaderName::from_static("x-multi-file-upload");

/// Session token issued or accepted (response).
pub const RESPONSE_SESSION_TOKEN: HeaderName = HeaderName::from_static("x-session-token");
/// Set on admissions through an existing session (response).
pub const RESPONSE_SESSION_VALID: HeaderName = HeaderName::from_static("x-session-valid");
/// Set when a new session was minted (response).
pub const RESPONSE_SESSION_CREATED: HeaderName = HeaderName::from_static("x-session-created");

/// Authorization inputs of one upload request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadHeaders {
    /// `x-upload-signed-message`
    pub signed_message: Option<String>,
    /// `x-uploader-address`
    pub uploader_address: Option<String>,
    /// `x-file-name`
    pub file_name: Option<String>,
    /// `swarm-postage-batch-id`
    pub batch_id: Option<String>,
    /// `x-message-content`
    pub message_content: Option<String>,
    /// `x-upload-session-token`
    pub session_token: Option<String>,
    /// `x-multi-file-upload: true`
    pub multi_file: bool,
}

impl UploadHeaders {
    /// Extract the authorization headers. Empty and non-UTF-8 values count as absent.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            signed_message: header_str(headers, &SIGNED_MESSAGE),
            uploader_address: header_str(headers, &UPLOADER_ADDRESS),
            file_name: header_str(headers, &FILE_NAME),
            batch_id: header_str(headers, &BATCH_ID),
            message_content: header_str(headers, &MESSAGE_CONTENT),
            session_token: header_str(headers, &SESSION_TOKEN),
            multi_file: header_str(headers, &MULTI_FILE_UPLOAD).as_deref() == Some("true"),
        }
    }

    /// The message the uploader is expected to have signed.
    #[must_use]
    pub fn message(&self, file_name: &str, batch_id: &str) -> String {
        self.message_content
            .clone()
            .unwrap_or_else(|| format!("{file_name}:{batch_id}"))
    }
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
