//! Property-based tests for status normalization.
//!
//! Uses proptest to verify:
//! 1. Normalization is idempotent for any input.
//! 2. Case, whitespace and punctuation variants of the canonical forms map
//!    to the same canonical state.
//! 3. Arbitrary text never panics and never yields a canonical state that
//!    its text form would not reproduce.

use pace_proto::status::{NormalizedStatus, TaskStatus, normalize_status};
use proptest::prelude::*;

/// Strategy for status-like text: printable ASCII plus known fragments.
fn arb_status_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{0,24}",
        (
            prop::sample::select(vec!["in", "to", "do", "done", "complete", "progress", "x"]),
            prop::sample::select(vec!["", " ", "-", "_", "  "]),
            prop::sample::select(vec!["progress", "do", "ne", "d", "", "todo"]),
        )
            .prop_map(|(a, sep, b)| format!("{a}{sep}{b}")),
    ]
}

/// Strategy that scrambles the case of a string and pads it with blanks.
fn scramble(text: &'static str) -> impl Strategy<Value = String> {
    (
        prop::collection::vec(any::<bool>(), text.len()),
        "[ \t]{0,3}",
        "[ \t]{0,3}",
    )
        .prop_map(move |(upper, left, right)| {
            let body: String = text
                .chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect();
            format!("{left}{body}{right}")
        })
}

proptest! {
    #[test]
    fn normalize_is_idempotent(text in arb_status_text()) {
        let once = normalize_status(Some(&text));
        let twice = normalize_status(Some(once.as_str()));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normalize_is_idempotent_for_any_unicode(text in "\\PC{0,16}") {
        let once = normalize_status(Some(&text));
        let twice = normalize_status(Some(once.as_str()));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn in_progress_variants(text in prop_oneof![
        scramble("in progress"),
        scramble("inprogress"),
        scramble("in-progress"),
        scramble("in_progress"),
    ]) {
        prop_assert_eq!(
            normalize_status(Some(&text)),
            NormalizedStatus::Canonical(TaskStatus::InProgress)
        );
    }

    #[test]
    fn to_do_variants(text in prop_oneof![
        scramble("to do"),
        scramble("todo"),
        scramble("to-do"),
    ]) {
        prop_assert_eq!(
            normalize_status(Some(&text)),
            NormalizedStatus::Canonical(TaskStatus::ToDo)
        );
    }

    #[test]
    fn done_variants(text in prop_oneof![
        scramble("done"),
        scramble("complete"),
        scramble("completed"),
    ]) {
        prop_assert_eq!(
            normalize_status(Some(&text)),
            NormalizedStatus::Canonical(TaskStatus::Done)
        );
    }

    #[test]
    fn only_done_is_done(text in arb_status_text()) {
        let status = normalize_status(Some(&text));
        prop_assert_eq!(status.is_done(), status.canonical() == Some(TaskStatus::Done));
        prop_assert_eq!(status.is_pending(), !status.is_done());
    }
}

#[test]
fn listed_variants_from_the_board() {
    for text in ["Done", "done", "DONE", "Complete", "completed"] {
        assert_eq!(normalize_status(Some(text)).canonical(), Some(TaskStatus::Done));
    }
    for text in ["In Progress", "inprogress", "IN-PROGRESS"] {
        assert_eq!(
            normalize_status(Some(text)).canonical(),
            Some(TaskStatus::InProgress)
        );
    }
}
