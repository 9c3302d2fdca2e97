//! Error taxonomy for the exchange synchronization core.
//!
//! Every public surface returns a `#[error(transparent)]` newtype wrapping a
//! private `*Kind` enum, so new failure modes can be added without breaking
//! callers matching on the outer type.

use std::fmt;

/// Top-level error produced by any operation in this crate.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ExchangeError(#[from] ExchangeErrorKind);

impl ExchangeError {
    /// True if retrying the operation that produced this error is meaningful
    /// (connection resets, timeouts, 5xx-with-timeout-body).
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ExchangeErrorKind::Transport(_))
    }

    /// True if the Exchange reported the node's credentials as no longer
    /// valid (HTTP 401). Callers must stop retrying and begin quiesce.
    pub fn is_auth_dead(&self) -> bool {
        matches!(self.0, ExchangeErrorKind::AuthDead)
    }

    /// HTTP status code, when this error originated from a response.
    pub fn status(&self) -> Option<u16> {
        match &self.0 {
            ExchangeErrorKind::Application { status, .. } => Some(*status),
            ExchangeErrorKind::AuthDead => Some(401),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExchangeErrorKind {
    #[error("transport error calling exchange: {0}")]
    Transport(#[source] TransportCause),

    #[error("exchange rejected credentials (401)")]
    AuthDead,

    #[error("exchange returned unexpected response ({status}): {body}")]
    Application { status: u16, body: String },

    #[error("expected exactly one {what}, got {got}")]
    CardinalityMismatch { what: &'static str, got: usize },

    #[error("unresolved dependency: microservice matching {spec_ref} ({org}, {version}) not found")]
    UnresolvedDependency {
        spec_ref: String,
        org: String,
        version: String,
    },

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("invalid version string: {0}")]
    InvalidVersion(String),

    #[error("invalid version range: {0}")]
    InvalidRange(String),

    #[error("local store failure: {0}")]
    Store(#[source] StoreCause),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

#[derive(Debug)]
pub(crate) enum TransportCause {
    Connect(reqwest::Error),
    Timeout(reqwest::Error),
    ServerTimedOut { status: u16 },
}

impl fmt::Display for TransportCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportCause::Connect(e) => write!(f, "connect failed: {e}"),
            TransportCause::Timeout(e) => write!(f, "request timed out: {e}"),
            TransportCause::ServerTimedOut { status } => {
                write!(f, "server reported a timeout (HTTP {status})")
            }
        }
    }
}

impl std::error::Error for TransportCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportCause::Connect(e) | TransportCause::Timeout(e) => Some(e),
            TransportCause::ServerTimedOut { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreCause {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ExchangeError {
    pub(crate) fn transport(cause: TransportCause) -> Self {
        ExchangeErrorKind::Transport(cause).into()
    }

    pub(crate) fn auth_dead() -> Self {
        ExchangeErrorKind::AuthDead.into()
    }

    pub(crate) fn application(status: u16, body: impl Into<String>) -> Self {
        ExchangeErrorKind::Application {
            status,
            body: body.into(),
        }
        .into()
    }

    pub(crate) fn cardinality(what: &'static str, got: usize) -> Self {
        ExchangeErrorKind::CardinalityMismatch { what, got }.into()
    }

    pub(crate) fn unresolved_dependency(
        spec_ref: impl Into<String>,
        org: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        ExchangeErrorKind::UnresolvedDependency {
            spec_ref: spec_ref.into(),
            org: org.into(),
            version: version.into(),
        }
        .into()
    }

    pub(crate) fn not_found(what: &'static str) -> Self {
        ExchangeErrorKind::NotFound(what).into()
    }

    pub(crate) fn invalid_version(s: impl Into<String>) -> Self {
        ExchangeErrorKind::InvalidVersion(s.into()).into()
    }

    pub(crate) fn invalid_range(s: impl Into<String>) -> Self {
        ExchangeErrorKind::InvalidRange(s.into()).into()
    }

    pub(crate) fn store(cause: StoreCause) -> Self {
        ExchangeErrorKind::Store(cause).into()
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ExchangeErrorKind::Internal(msg.into()).into()
    }
}

pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;
