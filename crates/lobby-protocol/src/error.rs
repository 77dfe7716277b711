//! Error types for the protocol layer.
//!
//! Header errors and payload errors are separate variants. A frame whose
//! header parsed can still be delivered to the right pending call even
//! when its payload turns out to be malformed.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame text was empty.
    #[error("empty frame")]
    Empty,

    /// The header has no `type` line.
    #[error("frame header has no type")]
    MissingType,

    /// A header line (`type`, `id`, `code`) has an unusable value.
    #[error("invalid header {key}: {value:?}")]
    InvalidHeader { key: &'static str, value: String },

    /// A payload line could not be parsed. `line` is 1-based and counts
    /// every line of the frame, header included.
    #[error("malformed payload at line {line}: {reason}")]
    MalformedPayload { line: usize, reason: String },

    /// A field can't be represented on the wire (empty key, a key with
    /// `:` or a newline, or a key that collides with a header name).
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// The payload decoded but does not have the shape the caller asked
    /// for.
    #[cfg(feature = "json")]
    #[error("payload shape mismatch: {0}")]
    Shape(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns `true` if this error came from the header block, meaning
    /// the frame could not even be routed.
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::MissingType | Self::InvalidHeader { .. }
        )
    }
}
