//! Export-sink error taxonomy.

/// A fatal failure for one export call. Unrepresentable musical constructs
/// (e.g. a note outside the UGE note range) are not fatal on their own —
/// the UGE sink transposes by octaves to fit and only raises a warning,
/// collected separately from this type.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// The sink couldn't write to the destination.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Serialization to the sink's wire format failed.
    #[error("failed to serialize ISM to JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The WAV writer rejected the stream.
    #[error("WAV export failed: {0}")]
    Wav(#[from] hound::Error),
}

/// Result alias used throughout the export sinks.
pub type Result<T> = std::result::Result<T, ExportError>;

/// A non-fatal export-time warning: when a value can't be represented in
/// the sink format, the affected cell is left empty and this warning is
/// emitted instead of failing the whole export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWarning {
    /// Channel the warning applies to, if any.
    pub channel: Option<u8>,
    /// Human-readable description.
    pub message: String,
}

impl ExportWarning {
    /// Build a warning not scoped to a specific channel.
    pub fn new(message: impl Into<String>) -> Self {
        Self { channel: None, message: message.into() }
    }

    /// Build a warning scoped to `channel`.
    pub fn on_channel(channel: u8, message: impl Into<String>) -> Self {
        Self { channel: Some(channel), message: message.into() }
    }
}
