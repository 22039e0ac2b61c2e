//! Stem selection resolution
//!
//! Turns the two comma-separated CLI stem lists into validated selections
//! over the closed [`Stem`] vocabulary. Pure validation: no side effects, and
//! it runs before any device is touched.

use crate::audio::Stem;
use crate::error::{Error, Result};

/// An ordered, de-duplicated set of stems feeding one bus.
///
/// Order is canonical (vocals, drums, bass, other) regardless of how the
/// user wrote the list; duplicates collapse to a single contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemSelection {
    stems: Vec<Stem>,
}

impl StemSelection {
    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    pub fn contains(&self, stem: Stem) -> bool {
        self.stems.contains(&stem)
    }
}

impl std::fmt::Display for StemSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stems.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join("+"))
    }
}

/// Resolve both stem lists, reporting every offending token at once.
///
/// Overlap between the two selections is permitted: the same stem may feed
/// both speakers.
///
/// # Errors
/// `Error::Validation` if either list is empty or contains a name outside
/// {vocals, drums, bass, other}.
pub fn resolve(left: &str, right: &str) -> Result<(StemSelection, StemSelection)> {
    let mut bad_tokens = Vec::new();

    let left_sel = parse_list(left, &mut bad_tokens);
    let right_sel = parse_list(right, &mut bad_tokens);

    if !bad_tokens.is_empty() {
        return Err(Error::Validation(format!(
            "unknown stem name(s): {} (valid: vocals, drums, bass, other)",
            bad_tokens.join(", ")
        )));
    }

    let left_sel = left_sel.ok_or_else(|| Error::Validation("left stem list is empty".into()))?;
    let right_sel =
        right_sel.ok_or_else(|| Error::Validation("right stem list is empty".into()))?;

    Ok((left_sel, right_sel))
}

/// Parse one comma-separated list. Returns None if the list has no valid,
/// non-empty tokens; collects unknown tokens into `bad_tokens`.
fn parse_list(list: &str, bad_tokens: &mut Vec<String>) -> Option<StemSelection> {
    let mut present = [false; Stem::ALL.len()];

    for token in list.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.parse::<Stem>() {
            Ok(stem) => {
                let idx = Stem::ALL.iter().position(|&s| s == stem).expect("in ALL");
                present[idx] = true;
            }
            Err(()) => bad_tokens.push(token.to_string()),
        }
    }

    let stems: Vec<Stem> = Stem::ALL
        .iter()
        .zip(present)
        .filter_map(|(&s, p)| p.then_some(s))
        .collect();

    if stems.is_empty() {
        None
    } else {
        Some(StemSelection { stems })
    }
}
