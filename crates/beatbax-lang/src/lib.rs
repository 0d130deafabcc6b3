//! BeatBax source language front end: lexing, parsing, import resolution,
//! pattern/sequence expansion, and AST-to-ISM resolution.
//!
//! The pipeline stages run in order:
//!
//! 1. [`parser::parse`] — source text to [`ast::Song`].
//! 2. [`import::resolve_imports`] — merges `import` declarations in place.
//! 3. [`resolve::resolve`] — walks every channel binding through the
//!    Pattern Expander ([`pattern`]) and Sequence Expander ([`sequence`])
//!    and produces the [`ism::Ism`] consumed by `beatbax-core`.

pub mod ast;
pub mod error;
pub mod import;
pub mod ism;
pub mod lexer;
pub mod notes;
pub mod parser;
pub mod pattern;
pub mod resolve;
pub mod sequence;
pub mod token;

pub use ast::Song;
pub use error::{ImportError, ParseError, ResolveError, ResolveWarning};
pub use ism::Ism;

/// Parse, resolve imports against the default local-filesystem fetcher,
/// and resolve to an [`Ism`] in one call. Most callers (CLI, tests) want
/// this; the individual stages are public for callers that need a custom
/// [`import::ImportFetcher`] or want to inspect the intermediate AST.
pub fn compile(source: &str, import_base_dir: impl Into<std::path::PathBuf>) -> Result<(Ism, Vec<ResolveWarning>), CompileError> {
    let mut song = parser::parse(source)?;
    let fetcher = import::LocalFsFetcher::new(import_base_dir);
    import::resolve_imports(&mut song, &fetcher, &import::ImportPolicy::default())?;
    let (ism, warnings) = resolve::resolve(&song)?;
    Ok((ism, warnings))
}

/// Any fatal error from the compile pipeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Lexing or parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Import resolution failed.
    #[error(transparent)]
    Import(#[from] ImportError),
    /// ISM resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_minimal_song() {
        let source = "bpm 120\ninst lead type=pulse1\npat mel = C4 D4 E4 .\nchannel 1 => inst lead pat mel\nplay";
        let (ism, warnings) = compile(source, ".").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ism.channels.len(), 1);
        assert_eq!(ism.channels[0].events.len(), 4);
    }
}
