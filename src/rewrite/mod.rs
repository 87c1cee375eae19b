//! Chapter title rewriting.
//!
//! Rules are `(match, replacement)` pairs applied in order to every title.
//! Replacement text is literal apart from counter placeholders such as `{nn}`,
//! see [`counter`].

pub mod counter;
pub mod pipeline;
pub mod rule;

pub use pipeline::{PreviewItem, RulePipeline, preview_all, resolve_all};
pub use rule::{Applied, Markup, MarkupSpan, PatternRule, SpanKind, apply};
