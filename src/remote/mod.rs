//! Remote persistence authority contract and HTTP implementation.

pub mod http;

use async_trait::async_trait;

use crate::{
    hunt::{HuntDraft, HuntPatch, HuntRecord},
    types::HuntId,
};

/// Errors from the remote authority boundary.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The authority answered with a non-success status code.
    #[error("remote authority error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The transport was unavailable before a request could be issued.
    #[error("remote unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    /// True when retrying the same request later could succeed.
    ///
    /// Transport failures and server-side (5xx) or throttling statuses are
    /// transient; any other rejection is treated as permanent so a broken
    /// operation cannot retry forever.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Unreachable(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        }
    }
}

/// Result alias for remote authority operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// The remote persistence authority for hunt records.
///
/// Delivery is at-least-once: every mutation carries absolute field values,
/// so replaying one is a harmless overwrite. Implementations must not expect
/// the engine to read record state out of update responses; only
/// success/failure is inspected (see [`update_hunt`](Self::update_hunt)).
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Fetches the complete current record set.
    async fn list_hunts(&self) -> RemoteResult<Vec<HuntRecord>>;

    /// Creates a hunt; the authority assigns the id and start timestamp.
    async fn create_hunt(&self, draft: &HuntDraft) -> RemoteResult<HuntRecord>;

    /// Partially updates a hunt. Any response body is discarded: fields the
    /// user can edit offline are locally authoritative, and adopting a stale
    /// confirmation would regress newer local values.
    async fn update_hunt(&self, id: HuntId, patch: &HuntPatch) -> RemoteResult<()>;

    /// Deletes a hunt.
    async fn delete_hunt(&self, id: HuntId) -> RemoteResult<()>;
}
