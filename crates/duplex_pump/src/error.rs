use thiserror::Error;

use crate::duplex::BoxError;

/// Failures while decoding input records or encoding output records.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown field(s) {}", fields.join(", "))]
    UnknownFields { fields: Vec<String> },
    #[error("record exceeds max_record_bytes (observed_bytes={observed_bytes}, max_record_bytes={max_record_bytes})")]
    RecordTooLarge {
        observed_bytes: usize,
        max_record_bytes: usize,
    },
}

/// First failure observed by a pump session.
///
/// The end-of-stream outcome of a duplex call is never represented here.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("input: {0}")]
    Decode(#[source] CodecError),
    #[error("send: {0}")]
    Send(#[source] BoxError),
    #[error("close: {0}")]
    Close(#[source] BoxError),
    #[error("recv: {0}")]
    Recv(#[source] BoxError),
    #[error("output: {0}")]
    Encode(#[source] CodecError),
    #[error("pump task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PumpError {
    /// Returns `true` when the failure came from the send side of the session.
    pub fn is_send_side(&self) -> bool {
        matches!(
            self,
            PumpError::Decode(_) | PumpError::Send(_) | PumpError::Close(_)
        )
    }
}
