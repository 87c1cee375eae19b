use std::time::{Duration, Instant};

use m4btui::rewrite::{PatternRule, SpanKind, preview_all, resolve_all};

fn rules(pairs: &[(&str, &str)]) -> Vec<PatternRule> {
    pairs.iter().map(|(m, r)| PatternRule::new(*m, *r)).collect()
}

#[test]
fn empty_replacement_deletes_and_marks_removals() {
    let titles = ["01 - Intro (Unabridged)", "02 - Storm (Unabridged)"];
    let rules = rules(&[(r" \(Unabridged\)", "")]);

    assert_eq!(resolve_all(&titles, &rules), ["01 - Intro", "02 - Storm"]);

    let preview = preview_all(&titles, &rules);
    let markup = preview[0].markup.as_ref().unwrap();
    assert_eq!(markup.text(), titles[0]);
    assert_eq!(
        markup.spans_of(SpanKind::Removal).collect::<Vec<_>>(),
        [" (Unabridged)"]
    );
    assert_eq!(
        markup.spans_of(SpanKind::Plain).collect::<Vec<_>>(),
        ["01 - Intro"]
    );
}

#[test]
fn inert_rules_leave_titles_alone() {
    let titles = ["One", "Two"];
    let rules = rules(&[("", "ignored")]);
    assert_eq!(resolve_all(&titles, &rules), titles);
    let preview = preview_all(&titles, &rules);
    assert!(preview.iter().all(|item| !item.is_markup()));
    assert_eq!(preview[1].text, "Two");
}

#[test]
fn rule_order_matters() {
    let forward = rules(&[("A", "B"), ("B", "C")]);
    let backward = rules(&[("B", "C"), ("A", "B")]);
    assert_eq!(resolve_all(&["A"], &forward), ["C"]);
    assert_eq!(resolve_all(&["A"], &backward), ["B"]);
}

#[test]
fn counter_is_padded_per_title() {
    let rules = rules(&[("x", "track-{nn}")]);
    assert_eq!(
        resolve_all(&["x", "x", "x"], &rules),
        ["track-01", "track-02", "track-03"]
    );
}

#[test]
fn offset_sets_the_first_number() {
    let rules = rules(&[("x", "{n+10}")]);
    assert_eq!(resolve_all(&["x", "x"], &rules), ["10", "11"]);
}

#[test]
fn malformed_pattern_is_isolated() {
    let rules = rules(&[("(", "Z"), ("x", "Y")]);
    assert_eq!(resolve_all(&["x"], &rules), ["Y"]);
    assert_eq!(preview_all(&["x"], &rules)[0].text, "Y");
}

#[test]
fn zero_length_matches_terminate() {
    let deleting = rules(&[("x*", "")]);
    let dashing = rules(&[("x*", "-")]);
    let start = Instant::now();
    assert_eq!(resolve_all(&["ab"], &deleting), ["ab"]);
    assert_eq!(resolve_all(&["ab"], &dashing), ["-a-b-"]);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn counter_ignores_earlier_rules() {
    let titles = ["Chapter One", "Chapter Two"];
    let rules = rules(&[("Chapter ", "Ch. "), ("One", "{n}")]);
    assert_eq!(resolve_all(&titles, &rules), ["Ch. 1", "Ch. Two"]);
}

#[test]
fn same_inputs_same_outputs() {
    let titles = ["Part 1", "Part 2"];
    let rules = rules(&[(r"\d", "{nnn}")]);
    let first = resolve_all(&titles, &rules);
    assert_eq!(first, resolve_all(&titles, &rules));
    assert_eq!(first, ["Part 001", "Part 002"]);
    // feeding output back in is not a no-op
    assert_ne!(resolve_all(&first, &rules), first);
}
