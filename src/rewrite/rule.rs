use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::rewrite::counter::resolve_placeholders;

/// One `match => replacement` rewrite rule. An empty `match` makes the rule inert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

impl PatternRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.pattern.is_empty()
    }

    /// Compiles the match expression. Inert rules compile to `None`.
    pub fn compile(&self) -> Result<Option<CompiledRule<'_>>, PatternError> {
        if !self.is_active() {
            return Ok(None);
        }
        let regex = Regex::new(&self.pattern).map_err(|source| PatternError {
            pattern: self.pattern.clone(),
            source,
        })?;
        Ok(Some(CompiledRule { rule: self, regex }))
    }
}

/// How a span of preview text is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Text passed through untouched.
    Plain,
    /// Resolved replacement text standing in for a match.
    Insertion,
    /// Matched text that an empty replacement deletes.
    Removal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSpan {
    pub kind: SpanKind,
    pub text: String,
}

/// A title rendered as marked spans, for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markup {
    pub spans: Vec<MarkupSpan>,
}

impl Markup {
    pub fn plain(text: &str) -> Self {
        let mut markup = Self::default();
        markup.push(SpanKind::Plain, text);
        markup
    }

    /// Appends text, merging with the previous span when the kinds agree.
    pub fn push(&mut self, kind: SpanKind, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => self.spans.push(MarkupSpan {
                kind,
                text: text.to_string(),
            }),
        }
    }

    /// The displayed text with markers stripped.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn spans_of(&self, kind: SpanKind) -> impl Iterator<Item = &str> {
        self.spans
            .iter()
            .filter(move |s| s.kind == kind)
            .map(|s| s.text.as_str())
    }
}

/// Result of running one rule over one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub title: String,
    /// `None` when the rule did not match.
    pub preview: Option<Markup>,
}

impl Applied {
    fn unchanged(title: &str) -> Self {
        Self {
            title: title.to_string(),
            preview: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule<'a> {
    rule: &'a PatternRule,
    regex: Regex,
}

impl CompiledRule<'_> {
    pub fn apply(&self, title: &str, counter: u64) -> Applied {
        let mut matches = self.regex.find_iter(title).peekable();
        if matches.peek().is_none() {
            return Applied::unchanged(title);
        }

        // placeholders resolve once per title, not per match
        let resolved = resolve_placeholders(&self.rule.replacement, counter);
        let removing = self.rule.replacement.is_empty();

        let mut new_title = String::with_capacity(title.len());
        let mut preview = Markup::default();
        let mut last_end = 0;
        for m in matches {
            let before = &title[last_end..m.start()];
            new_title.push_str(before);
            new_title.push_str(&resolved);
            preview.push(SpanKind::Plain, before);
            if removing {
                preview.push(SpanKind::Removal, m.as_str());
            } else {
                preview.push(SpanKind::Insertion, &resolved);
            }
            last_end = m.end();
        }
        new_title.push_str(&title[last_end..]);
        preview.push(SpanKind::Plain, &title[last_end..]);

        Applied {
            title: new_title,
            preview: Some(preview),
        }
    }
}

/// Applies a single rule to a title. A pattern that fails to compile leaves
/// the title unchanged.
pub fn apply(title: &str, rule: &PatternRule, counter: u64) -> Applied {
    match rule.compile() {
        Ok(Some(compiled)) => compiled.apply(title, counter),
        Ok(None) => Applied::unchanged(title),
        Err(err) => {
            tracing::warn!("skipping rule: {}", err);
            Applied::unchanged(title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_rule_is_a_no_op() {
        let applied = apply("Chapter One", &PatternRule::new("", "x"), 1);
        assert_eq!(applied, Applied::unchanged("Chapter One"));
    }

    #[test]
    fn invalid_pattern_is_a_no_op() {
        let applied = apply("a(b", &PatternRule::new("(", "Z"), 1);
        assert_eq!(applied.title, "a(b");
        assert!(applied.preview.is_none());
    }

    #[test]
    fn no_match_has_no_preview() {
        let applied = apply("Prologue", &PatternRule::new(r"\d+", "#"), 1);
        assert_eq!(applied.title, "Prologue");
        assert!(applied.preview.is_none());
    }

    #[test]
    fn replacement_is_marked_as_insertion() {
        let applied = apply("01 - Intro", &PatternRule::new(r"^\d+", "Track {nn}"), 7);
        assert_eq!(applied.title, "Track 07 - Intro");
        let preview = applied.preview.unwrap();
        assert_eq!(
            preview.spans,
            vec![
                MarkupSpan {
                    kind: SpanKind::Insertion,
                    text: "Track 07".into()
                },
                MarkupSpan {
                    kind: SpanKind::Plain,
                    text: " - Intro".into()
                },
            ]
        );
    }

    #[test]
    fn empty_replacement_marks_removed_text() {
        let applied = apply("Book_Part_1", &PatternRule::new("_", ""), 1);
        assert_eq!(applied.title, "BookPart1");
        let preview = applied.preview.unwrap();
        assert_eq!(preview.text(), "Book_Part_1");
        assert_eq!(preview.spans_of(SpanKind::Removal).collect::<Vec<_>>(), ["_", "_"]);
        assert_eq!(preview.spans_of(SpanKind::Insertion).count(), 0);
    }

    #[test]
    fn every_match_gets_the_same_counter() {
        let applied = apply("a-a-a", &PatternRule::new("a", "{n}"), 3);
        assert_eq!(applied.title, "3-3-3");
    }

    #[test]
    fn oversized_placeholder_stays_literal() {
        let wide = format!("{{{}}}", "n".repeat(70_000));
        let applied = apply("x", &PatternRule::new("x", wide.as_str()), 1);
        assert_eq!(applied.title, wide);
        assert_eq!(
            applied.preview.unwrap().spans_of(SpanKind::Insertion).collect::<Vec<_>>(),
            [wide.as_str()]
        );
    }

    #[test]
    fn replacement_is_literal() {
        let applied = apply("Disc 2", &PatternRule::new(r"(\d)", "$1!"), 1);
        assert_eq!(applied.title, "Disc $1!");
    }

    #[test]
    fn empty_matches_terminate() {
        let applied = apply("ab", &PatternRule::new("x*", "-"), 1);
        assert_eq!(applied.title, "-a-b-");
    }

    #[test]
    fn multibyte_titles_split_on_char_boundaries() {
        let applied = apply("第1章 开始", &PatternRule::new(r"第(\d+)章", "Ch. {nn}"), 1);
        assert_eq!(applied.title, "Ch. 01 开始");
    }
}
