//! Two-step confirmation for irreversible deletions.
//!
//! A delete request without a token never touches the store: it returns a
//! freshly issued [`ConfirmationToken`] the caller must echo back with the same
//! target. A request carrying a token is executed only when the token decodes,
//! is younger than [`CONFIRMATION_TOKEN_VALIDITY_SECS`], and names the same
//! target. Nothing is stored server-side, so a valid token can be replayed
//! until it expires.
//!
//! Wire format: standard base64 of `"{target_id}:{issued_at}"`. Decoding
//! splits at the *last* `:` (the timestamp is all digits), so targets that
//! themselves contain `:` survive the round trip.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use crate::audit::log_audit;
use crate::store::{RemoteObjectStore, StoreError};

/// How long an issued token is accepted, in seconds.
pub const CONFIRMATION_TOKEN_VALIDITY_SECS: i64 = 5 * 60;

// ── Clock ───────────────────────────────────────────────────────────────────

/// Wall-clock source, seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

// ── Token ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationToken {
    pub target_id: String,
    pub issued_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not valid base64")]
    Encoding,
    #[error("token payload is not UTF-8")]
    Utf8,
    #[error("token payload has no field separator")]
    MissingSeparator,
    #[error("token timestamp is not an integer")]
    Timestamp,
}

impl ConfirmationToken {
    pub fn new(target_id: impl Into<String>, issued_at: i64) -> Self {
        Self {
            target_id: target_id.into(),
            issued_at,
        }
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.target_id, self.issued_at))
    }

    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|_| TokenError::Encoding)?;
        let payload = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;
        let (target_id, issued_at) = payload
            .rsplit_once(':')
            .ok_or(TokenError::MissingSeparator)?;
        if issued_at.is_empty() || !issued_at.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::Timestamp);
        }
        let issued_at = issued_at.parse::<i64>().map_err(|_| TokenError::Timestamp)?;
        Ok(Self::new(target_id, issued_at))
    }
}

// ── Outcomes ────────────────────────────────────────────────────────────────

/// What is being deleted; only affects wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Item,
    File,
    Folder,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Item => "item",
            TargetKind::File => "file",
            TargetKind::Folder => "folder",
        })
    }
}

impl TargetKind {
    fn capitalized(self) -> &'static str {
        match self {
            TargetKind::Item => "Item",
            TargetKind::File => "File",
            TargetKind::Folder => "Folder",
        }
    }
}

/// Terminal state of one deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPhase {
    PendingConfirmation,
    Rejected,
    Done,
    Failed,
}

/// Why a token was refused before any delete was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyTarget,
    Malformed(TokenError),
    Expired { age_secs: i64 },
    Mismatch {
        token_target: String,
        request_target: String,
    },
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::EmptyTarget => "A target ID is required to delete an item.",
            Rejection::Malformed(_) => "Invalid confirmation token.",
            Rejection::Expired { .. } => {
                "Confirmation token has expired. Please request a new token."
            }
            Rejection::Mismatch { .. } => {
                "Invalid confirmation token. Parameters do not match, please request a new token."
            }
        }
    }
}

/// Why an authorised delete did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionFailure {
    /// The store refused; carries its own message.
    Remote(String),
    /// Anything else (network, decoding, local fault).
    Unexpected(String),
}

impl From<StoreError> for DeletionFailure {
    fn from(e: StoreError) -> Self {
        if e.is_remote() {
            DeletionFailure::Remote(e.to_string())
        } else {
            DeletionFailure::Unexpected(format!("Unexpected error: {}", e))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    ConfirmationRequired { token: String, message: String },
    Rejected(Rejection),
    Deleted { message: String },
    Failed(DeletionFailure),
}

impl DeletionOutcome {
    pub fn phase(&self) -> DeletionPhase {
        match self {
            DeletionOutcome::ConfirmationRequired { .. } => DeletionPhase::PendingConfirmation,
            DeletionOutcome::Rejected(_) => DeletionPhase::Rejected,
            DeletionOutcome::Deleted { .. } => DeletionPhase::Done,
            DeletionOutcome::Failed(_) => DeletionPhase::Failed,
        }
    }

    /// Response payload handed back to the tool caller.
    pub fn to_json(&self) -> Value {
        match self {
            DeletionOutcome::ConfirmationRequired { token, message } => json!({
                "action": "confirm_deletion",
                "confirmation_token": token,
                "message": message,
            }),
            DeletionOutcome::Rejected(r) => match r {
                Rejection::Mismatch {
                    token_target,
                    request_target,
                } => json!({
                    "error": r.message(),
                    "details": {
                        "token_params": { "target_id": token_target },
                        "request_params": { "target_id": request_target },
                    },
                }),
                _ => json!({ "error": r.message() }),
            },
            DeletionOutcome::Deleted { message } => json!({
                "status": "success",
                "message": message,
            }),
            DeletionOutcome::Failed(DeletionFailure::Remote(m))
            | DeletionOutcome::Failed(DeletionFailure::Unexpected(m)) => json!({
                "status": "error",
                "error": m,
            }),
        }
    }
}

// ── Gate ────────────────────────────────────────────────────────────────────

/// Stateless apart from its clock; share one instance across requests.
#[derive(Clone)]
pub struct ConfirmationGate {
    clock: Arc<dyn Clock>,
    validity_secs: i64,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ConfirmationGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            validity_secs: CONFIRMATION_TOKEN_VALIDITY_SECS,
        }
    }

    pub fn issue(&self, target_id: &str) -> ConfirmationToken {
        ConfirmationToken::new(target_id, self.clock.now())
    }

    /// Decode `raw` and check it against `target_id`: expiry first, binding second.
    pub fn validate(&self, target_id: &str, raw: &str) -> Result<ConfirmationToken, Rejection> {
        let token = ConfirmationToken::decode(raw).map_err(Rejection::Malformed)?;

        let age_secs = self.clock.now().saturating_sub(token.issued_at);
        if age_secs > self.validity_secs {
            return Err(Rejection::Expired { age_secs });
        }

        if token.target_id != target_id {
            return Err(Rejection::Mismatch {
                token_target: token.target_id,
                request_target: target_id.to_string(),
            });
        }
        Ok(token)
    }

    /// Without a token: issue one and stop. With a token: validate it and, if
    /// it holds, call `store.delete(target_id)` exactly once.
    pub async fn request_deletion(
        &self,
        store: &dyn RemoteObjectStore,
        kind: TargetKind,
        target_id: &str,
        confirmation_token: Option<&str>,
    ) -> DeletionOutcome {
        if target_id.is_empty() {
            return DeletionOutcome::Rejected(Rejection::EmptyTarget);
        }

        let Some(raw) = confirmation_token.filter(|t| !t.is_empty()) else {
            let token = self.issue(target_id).encode();
            tracing::info!(target_id = %target_id, kind = %kind, "confirmation token issued");
            return DeletionOutcome::ConfirmationRequired {
                token,
                message: format!(
                    "Confirmation required to delete {} with ID '{}'. Confirm deletion with user and use the given confirmation_token with the same request parameters.",
                    kind, target_id
                ),
            };
        };

        if let Err(rejection) = self.validate(target_id, raw) {
            tracing::warn!(target_id = %target_id, reason = ?rejection, "deletion rejected");
            log_audit(
                "deletion_rejected",
                json!({ "target_id": target_id, "kind": kind.to_string(), "reason": format!("{:?}", rejection) }),
            );
            return DeletionOutcome::Rejected(rejection);
        }

        match store.delete(target_id).await {
            Ok(()) => {
                tracing::info!(target_id = %target_id, kind = %kind, "deleted");
                log_audit(
                    "deletion_executed",
                    json!({ "target_id": target_id, "kind": kind.to_string() }),
                );
                DeletionOutcome::Deleted {
                    message: format!("{} deleted successfully.", kind.capitalized()),
                }
            }
            Err(e) => {
                tracing::error!(target_id = %target_id, remote = e.is_remote(), "delete failed: {}", e);
                log_audit(
                    "deletion_failed",
                    json!({ "target_id": target_id, "kind": kind.to_string(), "error": e.to_string() }),
                );
                DeletionOutcome::Failed(e.into())
            }
        }
    }
}

/// Settable clock for tests and simulations.
pub struct FixedClock(std::sync::atomic::AtomicI64);

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, std::sync::atomic::Ordering::Release);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::AcqRel);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}
