use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::rewrite::rule::{CompiledRule, Markup, PatternRule};

/// One entry of the rich preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewItem {
    pub text: String,
    /// Marked spans of the last rule that matched, if any did.
    pub markup: Option<Markup>,
}

impl PreviewItem {
    fn plain(title: &str) -> Self {
        Self {
            text: title.to_string(),
            markup: None,
        }
    }

    pub fn is_markup(&self) -> bool {
        self.markup.is_some()
    }
}

/// Ordered list of rewrite rules. Order matters: each rule sees the output of
/// the one before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePipeline {
    #[serde(rename = "rule", default)]
    rules: Vec<PatternRule>,
}

impl From<Vec<PatternRule>> for RulePipeline {
    fn from(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }
}

impl RulePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends a rule and returns its index.
    pub fn push(&mut self, rule: PatternRule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = PatternRule>) {
        self.rules.extend(rules);
    }

    pub fn remove(&mut self, index: usize) -> Option<PatternRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PatternRule> {
        self.rules.get_mut(index)
    }

    /// Swaps the rule with its predecessor. Returns false at the top.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.rules.len() {
            return false;
        }
        self.rules.swap(index - 1, index);
        true
    }

    /// Swaps the rule with its successor. Returns false at the bottom.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.rules.len() {
            return false;
        }
        self.rules.swap(index, index + 1);
        true
    }

    pub fn preview_all<S: AsRef<str>>(&self, titles: &[S]) -> Vec<PreviewItem> {
        preview_all(titles, &self.rules)
    }

    pub fn resolve_all<S: AsRef<str>>(&self, titles: &[S]) -> Vec<String> {
        resolve_all(titles, &self.rules)
    }
}

/// Renders every title with the markup of the last rule that changed it.
pub fn preview_all<S: AsRef<str>>(titles: &[S], rules: &[PatternRule]) -> Vec<PreviewItem> {
    match run_guarded(titles, rules) {
        Some(outcomes) => outcomes
            .into_iter()
            .map(|(title, markup)| match markup {
                Some(markup) => PreviewItem {
                    text: markup.text(),
                    markup: Some(markup),
                },
                None => PreviewItem::plain(&title),
            })
            .collect(),
        None => titles.iter().map(|t| PreviewItem::plain(t.as_ref())).collect(),
    }
}

/// Final chapter titles, positionally aligned with `titles`.
pub fn resolve_all<S: AsRef<str>>(titles: &[S], rules: &[PatternRule]) -> Vec<String> {
    match run_guarded(titles, rules) {
        Some(outcomes) => outcomes.into_iter().map(|(resolved, _)| resolved).collect(),
        None => titles.iter().map(|t| t.as_ref().to_string()).collect(),
    }
}

/// Per title: the resolved title and the markup of the last matching rule.
type Outcome = (String, Option<Markup>);

/// Runs a pass, falling back to `None` (the originals) if anything panics.
fn run_guarded<S: AsRef<str>>(titles: &[S], rules: &[PatternRule]) -> Option<Vec<Outcome>> {
    if !rules.iter().any(PatternRule::is_active) {
        return None;
    }
    guarded(|| run_pass(titles, rules))
}

/// Contains a panic from `pass`, logging it as a `PipelineError`.
fn guarded(pass: impl FnOnce() -> Vec<Outcome>) -> Option<Vec<Outcome>> {
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(outcomes) => Some(outcomes),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{}, using original titles", PipelineError(message));
            None
        }
    }
}

fn run_pass<S: AsRef<str>>(titles: &[S], rules: &[PatternRule]) -> Vec<Outcome> {
    let compiled: Vec<CompiledRule<'_>> = rules
        .iter()
        .filter_map(|rule| match rule.compile() {
            Ok(compiled) => compiled,
            Err(err) => {
                tracing::warn!("skipping rule: {}", err);
                None
            }
        })
        .collect();

    titles
        .iter()
        .enumerate()
        .map(|(i, original)| {
            let counter = i as u64 + 1;
            let mut title = original.as_ref().to_string();
            let mut last_preview = None;
            for rule in &compiled {
                let applied = rule.apply(&title, counter);
                title = applied.title;
                if applied.preview.is_some() {
                    last_preview = applied.preview;
                }
            }
            (title, last_preview)
        })
        .collect()
}
