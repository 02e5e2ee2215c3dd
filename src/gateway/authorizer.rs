//! Upload authorization: session short-circuit, then signature and batch
//! payer verification.

use super::headers::{
    UploadHeaders, RESPONSE_SESSION_CREATED, RESPONSE_SESSION_TOKEN, RESPONSE_SESSION_VALID,
};
use super::redact;
use super::rejection::{MissingHeaders, Rejection};
use crate::chain::{normalize_batch_id, ChainVerifier, ZERO_ADDRESS};
use crate::event::{GatewayEvent, GatewayEventsSender};
use crate::session::{SessionStore, UploadSession};
use axum::http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Admitted on an existing session; nothing was re-verified.
    SessionReused(UploadSession),
    /// Admitted after full verification, with a session if one was requested.
    Verified {
        /// Session minted for a multi-file upload.
        session: Option<UploadSession>,
    },
}

impl Admission {
    /// Returns true if the signature and registry checks were skipped.
    #[must_use]
    pub fn skipped_verification(&self) -> bool {
        matches!(self, Self::SessionReused(_))
    }

    /// Session this admission used or created, if any.
    #[must_use]
    pub fn session(&self) -> Option<&UploadSession> {
        match self {
            Self::SessionReused(session) => Some(session),
            Self::Verified { session } => session.as_ref(),
        }
    }

    /// Attach the session response headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let Some(session) = self.session() else {
            return;
        };
        let Ok(token) = HeaderValue::from_str(&session.token) else {
            return;
        };
        headers.insert(RESPONSE_SESSION_TOKEN, token);

        let flag = match self {
            Self::SessionReused(_) => RESPONSE_SESSION_VALID,
            Self::Verified { .. } => RESPONSE_SESSION_CREATED,
        };
        headers.insert(flag, HeaderValue::from_static("true"));
    }
}

/// Decides whether an upload may be forwarded.
pub struct UploadAuthorizer {
    verifier: Arc<dyn ChainVerifier>,
    sessions: SessionStore,
    check_batch_payer: bool,
    events_tx: Option<GatewayEventsSender>,
}

impl UploadAuthorizer {
    /// Create an authorizer that checks signatures and batch payers.
    #[must_use]
    pub fn new(verifier: Arc<dyn ChainVerifier>, sessions: SessionStore) -> Self {
        Self {
            verifier,
            sessions,
            check_batch_payer: true,
            events_tx: None,
        }
    }

    /// Enable or disable the batch payer check (no registry configured).
    #[must_use]
    pub fn with_batch_payer_check(mut self, enabled: bool) -> Self {
        self.check_batch_payer = enabled;
        self
    }

    /// Report admissions and rejections on `events_tx`.
    #[must_use]
    pub fn with_events(mut self, events_tx: GatewayEventsSender) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    /// The session store in use.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Authorize one upload.
    ///
    /// A live session bound to the request's uploader and batch admits the
    /// request outright. Otherwise the signature is verified and, if
    /// enabled, the uploader must be the batch's registered payer.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] to send back when the upload is refused.
    pub async fn authorize(&self, upload: &UploadHeaders) -> Result<Admission, Rejection> {
        if let Some(session) = self.try_session(upload) {
            self.emit(GatewayEvent::SessionReused {
                uploader: session.uploader_address.clone(),
                file_count: session.file_count,
            });
            return Ok(Admission::SessionReused(session));
        }

        match self.verify(upload).await {
            Ok(admission) => Ok(admission),
            Err(rejection) => {
                warn!(
                    status = rejection.status().as_u16(),
                    uploader = upload.uploader_address.as_deref().unwrap_or("-"),
                    "Upload rejected: {rejection}"
                );
                self.emit(GatewayEvent::UploadRejected {
                    status: rejection.status().as_u16(),
                    reason: rejection.to_string(),
                });
                Err(rejection)
            }
        }
    }

    fn try_session(&self, upload: &UploadHeaders) -> Option<UploadSession> {
        let (Some(token), Some(uploader), Some(batch_id)) = (
            upload.session_token.as_deref(),
            upload.uploader_address.as_deref(),
            upload.batch_id.as_deref(),
        ) else {
            return None;
        };

        match self.sessions.redeem(token, uploader, batch_id) {
            Some(session) => {
                info!(
                    token = %redact(token),
                    uploader = %session.uploader_address,
                    file_count = session.file_count,
                    "Upload admitted on session"
                );
                Some(session)
            }
            None => {
                debug!(
                    token = %redact(token),
                    "Session unknown, expired or bound elsewhere; verifying in full"
                );
                None
            }
        }
    }

    async fn verify(&self, upload: &UploadHeaders) -> Result<Admission, Rejection> {
        let (Some(signature), Some(uploader), Some(file_name), Some(batch_id)) = (
            upload.signed_message.as_deref(),
            upload.uploader_address.as_deref(),
            upload.file_name.as_deref(),
            upload.batch_id.as_deref(),
        ) else {
            return Err(Rejection::MissingHeaders(MissingHeaders::of(upload)));
        };

        let message = upload.message(file_name, batch_id);
        debug!(
            uploader,
            file_name,
            batch_id,
            signature = %redact(signature),
            "Verifying upload signature"
        );

        let valid = self
            .verifier
            .verify_signature(uploader, &message, signature)
            .await
            .map_err(|e| Rejection::VerificationFailed {
                details: e.to_string(),
            })?;
        if !valid {
            let recovered = self
                .verifier
                .recover_signer(&message, signature)
                .await
                .ok()
                .flatten();
            return Err(Rejection::InvalidSignature {
                provided: uploader.to_string(),
                recovered,
            });
        }

        if self.check_batch_payer {
            self.verify_batch_payer(uploader, batch_id).await?;
        } else {
            debug!("No batch registry configured, skipping payer check");
        }

        let session = upload.multi_file.then(|| {
            let session = self.sessions.create(uploader, batch_id);
            info!(
                token = %redact(&session.token),
                uploader = %session.uploader_address,
                batch_id,
                "Upload session created"
            );
            self.emit(GatewayEvent::SessionCreated {
                uploader: session.uploader_address.clone(),
                batch_id: session.batch_id.clone(),
            });
            session
        });

        info!(uploader, file_name, batch_id, "Upload verified");
        Ok(Admission::Verified { session })
    }

    async fn verify_batch_payer(&self, uploader: &str, batch_id: &str) -> Result<(), Rejection> {
        let batch_id = normalize_batch_id(batch_id);
        let payer = self.verifier.batch_payer(&batch_id).await.map_err(|e| {
            if e.is_infrastructure() {
                tracing::error!("Batch registry read failed for {batch_id}: {e}");
                Rejection::VerifierUnavailable {
                    details: e.to_string(),
                }
            } else {
                Rejection::VerificationFailed {
                    details: e.to_string(),
                }
            }
        })?;

        if payer.eq_ignore_ascii_case(ZERO_ADDRESS) {
            return Err(Rejection::BatchNotFound { batch_id });
        }
        if !payer.eq_ignore_ascii_case(uploader) {
            return Err(Rejection::NotBatchPayer {
                batch_payer: payer,
                uploader: uploader.to_string(),
            });
        }

        debug!("Uploader {uploader} is payer of batch {batch_id}");
        Ok(())
    }

    fn emit(&self, event: GatewayEvent) {
        if let Some(ref tx) = self.events_tx {
            let _ = tx.send(event);
        }
    }
}
