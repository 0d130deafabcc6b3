//! Sequence Expander.
//!
//! Resolves a `seq` or `pat` name into a single flat token stream, walking
//! nested `seq` references depth-first. Reference cycles are fatal
//! ([`ResolveError::Cycle`]); unknown references are a warning and expand
//! to nothing, matching the Pattern Expander's treatment of unknown
//! transforms.

use crate::ast::Song;
use crate::error::{ResolveError, ResolveWarning};
use crate::pattern::{apply_mods, expand_pattern_body, ExpandedTok};

const COMPONENT: &str = "sequence-expander";

/// Expand `name` (a pattern or a sequence) into a flat, source-tagged
/// token stream.
pub fn expand_reference(song: &Song, name: &str, warnings: &mut Vec<ResolveWarning>) -> Result<Vec<ExpandedTok>, ResolveError> {
    let mut stack = Vec::new();
    expand_inner(song, name, &mut stack, warnings)
}

fn expand_inner(
    song: &Song,
    name: &str,
    stack: &mut Vec<String>,
    warnings: &mut Vec<ResolveWarning>,
) -> Result<Vec<ExpandedTok>, ResolveError> {
    if stack.iter().any(|s| s == name) {
        let mut chain = stack.clone();
        chain.push(name.to_string());
        return Err(ResolveError::Cycle(chain.join(" -> ")));
    }

    if let Some(body) = song.pats.get(name) {
        let expanded = expand_pattern_body(body, Some(name));
        return Ok(match song.pat_mods.get(name) {
            Some(mods) => apply_mods(expanded, mods, COMPONENT, warnings),
            None => expanded,
        });
    }

    if let Some(items) = song.seqs.get(name) {
        stack.push(name.to_string());
        let mut out = Vec::new();
        for item in items {
            let referenced = if song.pats.contains_key(&item.name) || song.seqs.contains_key(&item.name) {
                expand_inner(song, &item.name, stack, warnings)?
            } else {
                warnings.push(ResolveWarning::at(
                    COMPONENT,
                    format!("unknown pattern/sequence reference '{}'", item.name),
                    item.pos,
                ));
                Vec::new()
            };
            let transformed = apply_mods(referenced, &item.mods, COMPONENT, warnings);
            for _ in 0..item.repeat.max(1) {
                out.extend(transformed.clone());
            }
        }
        stack.pop();
        return Ok(out);
    }

    warnings.push(ResolveWarning::new(COMPONENT, format!("unknown pattern/sequence reference '{name}'")));
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PatItem, PatTokenKind};
    use crate::parser::parse;

    fn note_name(tok: &ExpandedTok) -> Option<&str> {
        match &tok.item {
            PatItem::Tok { kind: PatTokenKind::Note(n, _), .. } => Some(n),
            _ => None,
        }
    }

    #[test]
    fn expands_nested_sequence_references() {
        let song = parse("pat a = C4 D4\npat b = E4\nseq main = a b*2").unwrap();
        let mut warnings = Vec::new();
        let out = expand_reference(&song, "main", &mut warnings).unwrap();
        assert_eq!(out.len(), 4); // C4 D4 E4 E4
        assert_eq!(note_name(&out[0]), Some("C4"));
        assert_eq!(out[0].source_pattern.as_deref(), Some("a"));
        assert_eq!(out[2].source_pattern.as_deref(), Some("b"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn detects_cycles() {
        let song = parse("seq a = b\nseq b = a").unwrap();
        let mut warnings = Vec::new();
        let err = expand_reference(&song, "a", &mut warnings).unwrap_err();
        assert!(matches!(err, ResolveError::Cycle(_)));
    }

    #[test]
    fn unknown_reference_warns_and_expands_to_nothing() {
        let song = parse("seq main = ghost").unwrap();
        let mut warnings = Vec::new();
        let out = expand_reference(&song, "main", &mut warnings).unwrap();
        assert!(out.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("ghost"));
    }
}
