//! Upload authorization gateway.
//!
//! Only `POST` requests are inspected. Each one is admitted through a live
//! upload session or by full verification:
//!
//! 1. signature over `x-message-content` (or `"{file}:{batch}"`) recovers to
//!    `x-uploader-address`
//! 2. the batch registry names the uploader as the batch payer
//!
//! A verified request flagged `x-multi-file-upload: true` mints a session
//! whose token is returned in `x-session-token`.

mod authorizer;
pub mod headers;
mod middleware;
mod rejection;

pub use authorizer::{Admission, UploadAuthorizer};
pub use headers::UploadHeaders;
pub use middleware::require_upload_authorization;
pub use rejection::{MissingHeaders, Rejection};

/// Characters of a secret kept when logging it.
const REDACT_PREFIX: usize = 10;

/// Shorten a signature or token for logging.
#[must_use]
pub fn redact(secret: &str) -> String {
    match secret.char_indices().nth(REDACT_PREFIX) {
        Some((idx, _)) => format!("{}...", &secret[..idx]),
        None => secret.to_string(),
    }
}
