//! Error types for rendering and playback.

/// A DSP kernel or buffered-render failure for a single event. Non-fatal:
/// the caller logs it and continues with the next event.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// The event referenced an instrument that no longer exists in the
    /// resolved ISM's instrument table.
    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    /// A `Named` event had no instrument and no channel default to fall
    /// back on, so no kernel could be selected.
    #[error("named event '{0}' has no resolvable instrument")]
    NoInstrumentForTrigger(String),

    /// The kernel backing an instrument's `kind` isn't implemented.
    #[error("unsupported instrument kind for '{0}'")]
    UnsupportedKind(String),
}

/// A buffered-renderer failure. Fatal for the render call that raised it,
/// but does not affect already-completed segments.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A segment was asked to render past `maxPreRenderSegments` with no
    /// fallback scheduler registered.
    #[error("pre-render backlog exceeded ({0} pending) with no direct-scheduling fallback")]
    BacklogExceeded(usize),

    /// Per-event playback failure surfaced up when the caller asked for a
    /// hard failure instead of best-effort continuation.
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Result alias used throughout the renderer and player.
pub type Result<T> = std::result::Result<T, RenderError>;
