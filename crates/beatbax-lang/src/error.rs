//! Error and diagnostic types for the parse/import/resolve pipeline.

use std::fmt;

/// A line/column position in source text, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column (character, not byte).
    pub col: usize,
}

impl Position {
    /// Construct a position.
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Fatal error raised by the lexer or parser.
///
/// Parse errors are fatal for the call that produced them; the playback
/// path treats them as unrecoverable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{start}: {message}")]
pub struct ParseError {
    /// Human readable description of what went wrong.
    pub message: String,
    /// Start position of the offending span.
    pub start: Position,
    /// End position of the offending span.
    pub end: Position,
}

impl ParseError {
    /// Build a parse error spanning a single position.
    pub fn at(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            start: pos,
            end: pos,
        }
    }

    /// Build a parse error spanning a range.
    pub fn spanning(message: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            message: message.into(),
            start,
            end,
        }
    }
}

/// Fatal error raised by the import resolver.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The import URL's scheme isn't in the resolver's allow-list.
    #[error("import scheme not allowed: {0}")]
    SchemeDisallowed(String),

    /// A non-local import was requested while the resolver is configured
    /// HTTPS-only and the URL was plain HTTP.
    #[error("insecure import rejected (https-only): {0}")]
    InsecureUrl(String),

    /// The fetched file exceeded the configured size limit.
    #[error("import exceeds max file size ({limit} bytes): {url}")]
    TooLarge {
        /// Offending URL.
        url: String,
        /// Configured byte limit.
        limit: usize,
    },

    /// Fetching the file took longer than the configured timeout.
    #[error("import timed out: {0}")]
    Timeout(String),

    /// The file could not be found or read.
    #[error("import not found: {0}")]
    NotFound(String),

    /// An imported `.ins` file contained something other than `inst`
    /// declarations. Local imports may additionally contain further
    /// `import`s; remote imports may not nest imports at all.
    #[error("import contains disallowed content (expected only `inst` declarations): {0}")]
    RemoteContainsNonInst(String),

    /// Import graph contains a cycle.
    #[error("import cycle detected: {0}")]
    Cycle(String),

    /// The imported file failed to parse.
    #[error("failed to parse import {url}: {source}")]
    Parse {
        /// URL of the file that failed to parse.
        url: String,
        /// Underlying parse error.
        #[source]
        source: ParseError,
    },

    /// Fetching the remote import failed at the transport layer.
    #[error("fetch failed for {url}: {message}")]
    FetchFailed {
        /// URL that failed to fetch.
        url: String,
        /// Transport-level error message.
        message: String,
    },
}

/// Non-fatal finding surfaced by the resolver. Collected into a `Vec` and
/// returned alongside the ISM; never aborts resolution.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolveWarning {
    /// Which pipeline component raised the warning (`"resolver"`,
    /// `"pattern-expander"`, `"sequence-expander"`, ...).
    pub component: String,
    /// Human readable description.
    pub message: String,
    /// Source location, when known.
    pub loc: Option<Position>,
}

impl ResolveWarning {
    /// Build a resolver warning with no location information.
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
            loc: None,
        }
    }

    /// Build a resolver warning anchored to a source location.
    pub fn at(component: impl Into<String>, message: impl Into<String>, loc: Position) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
            loc: Some(loc),
        }
    }
}

impl fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "[{}] {} ({loc})", self.component, self.message),
            None => write!(f, "[{}] {}", self.component, self.message),
        }
    }
}

/// Fatal error raised while resolving the AST to the Internal Song Model.
/// Distinct from [`ResolveWarning`]: these abort resolution entirely
/// because there is no reasonable token stream to fall back on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A `seq`/`pat` reference graph contains a cycle.
    #[error("sequence/pattern reference cycle detected: {0}")]
    Cycle(String),

    /// A channel binding has nothing playable: no sequence, no pattern,
    /// and (if one existed) it resolved to zero events.
    #[error("channel {0} has no playable sequence or pattern bound")]
    NoPlayableContent(u8),
}

/// Result alias used throughout the parse/import stages.
pub type Result<T> = std::result::Result<T, ParseError>;
