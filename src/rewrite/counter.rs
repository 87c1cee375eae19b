//! Chapter counter placeholders.
//!
//! A replacement string may embed `{n}`, `{nn}`, `{nnn+5}` and so on. The run
//! of `n` characters is the zero-padding width. Without an offset the
//! placeholder renders the chapter counter itself (1 for the first title);
//! `+K` makes numbering start at `K` instead.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::FormatError;

/// Widest padding the formatter can render.
pub const MAX_WIDTH: usize = u16::MAX as usize;

pub static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{n+(?:\+\d+)?\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSpec {
    pub width: usize,
    pub start: Option<u64>,
}

impl FromStr for CounterSpec {
    type Err = FormatError;

    /// Parses a placeholder body, i.e. the text between the braces.
    fn from_str(body: &str) -> Result<Self, Self::Err> {
        let width = body.chars().take_while(|&c| c == 'n').count();
        if width == 0 {
            return Err(FormatError::Malformed(body.to_string()));
        }
        if width > MAX_WIDTH {
            return Err(FormatError::TooWide(width));
        }
        let rest = &body[width..];
        if rest.is_empty() {
            return Ok(Self { width, start: None });
        }
        let digits = rest
            .strip_prefix('+')
            .ok_or_else(|| FormatError::Malformed(body.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::BadOffset(body.to_string()));
        }
        let start = digits
            .parse::<u64>()
            .map_err(|_| FormatError::BadOffset(body.to_string()))?;
        Ok(Self {
            width,
            start: Some(start),
        })
    }
}

impl CounterSpec {
    /// Number shown for the given chapter counter (1-based).
    pub fn value(&self, counter: u64, body: &str) -> Result<u64, FormatError> {
        match self.start {
            None => Ok(counter),
            Some(start) => counter
                .saturating_sub(1)
                .checked_add(start)
                .ok_or_else(|| FormatError::Overflow(body.to_string())),
        }
    }
}

/// Renders a single placeholder body (`nn+5`) for a chapter counter.
///
/// Values longer than the width are rendered in full.
pub fn format_counter(counter: u64, body: &str) -> Result<String, FormatError> {
    let spec: CounterSpec = body.parse()?;
    let value = spec.value(counter, body)?;
    Ok(format!("{:0width$}", value, width = spec.width))
}

/// Substitutes every placeholder in `replacement` using the same counter.
///
/// A placeholder that cannot be formatted stays as literal text.
pub fn resolve_placeholders(replacement: &str, counter: u64) -> String {
    PLACEHOLDER_RE
        .replace_all(replacement, |caps: &Captures| {
            let token = &caps[0];
            let body = &token[1..token.len() - 1];
            match format_counter(counter, body) {
                Ok(formatted) => formatted,
                Err(err) => {
                    tracing::warn!("leaving placeholder {} unresolved: {}", token, err);
                    token.to_string()
                }
            }
        })
        .into_owned()
}
