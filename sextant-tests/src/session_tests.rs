//! Session token reconciliation scenarios across topology changes.

// Test-specific lint allowances.
#![allow(clippy::similar_names)]

use sextant_core::KeyRange;
use sextant_session::{latest_session_token, RangeToken, SessionToken, VectorTimestamp};

fn range(min: &str, max: &str) -> KeyRange {
    KeyRange::new(min, max, true, false)
}

fn token(id: &str, version: i64, global_lsn: i64) -> SessionToken {
    SessionToken::single(RangeToken::new(id, VectorTimestamp::new(version, global_lsn)))
}

#[test]
fn test_session_fresh_children_supersede_recorded_parent() {
    // A write was recorded against the pre-split parent; later writes were
    // recorded against both children and both are more advanced. The merged
    // token must be the children's compound token, not the stale parent.
    let parent = (range("A", "FF"), token("1", 1, 90));
    let left = (range("A", "M"), token("2", 1, 120));
    let right = (range("M", "FF"), token("3", 1, 140));

    let result = latest_session_token(
        &[parent, left, right],
        &range("A", "FF"),
    )
    .expect("candidates overlap the target");

    assert!(result.is_compound());
    assert_eq!(result.to_string(), "2:1#120,3:1#140");
}

#[test]
fn test_session_parent_ahead_of_children_survives() {
    // The parent saw writes after the children's markers were taken (e.g. a
    // merge landed and progressed): it alone satisfies the guarantee.
    let parent = (range("A", "FF"), token("9", 2, 500));
    let left = (range("A", "M"), token("2", 1, 120));
    let right = (range("M", "FF"), token("3", 1, 140));

    let result = latest_session_token(
        &[left, parent, right],
        &range("A", "FF"),
    )
    .expect("candidates overlap the target");

    assert_eq!(result.to_string(), "9:2#500");
}

#[test]
fn test_session_round_trip_through_text() {
    // Tokens arrive as header text; reconcile them and render the result.
    let recorded = [
        ("A", "M", "2:1#120#1=100"),
        ("M", "FF", "3:1#140#1=135"),
        ("A", "FF", "1:1#90#1=80"),
    ];
    let candidates: Vec<(KeyRange, SessionToken)> = recorded
        .iter()
        .map(|(min, max, text)| {
            (
                range(min, max),
                SessionToken::parse(text).expect("recorded tokens are well formed"),
            )
        })
        .collect();

    let result =
        latest_session_token(&candidates, &range("A", "FF")).expect("overlapping candidates");
    assert_eq!(result.to_string(), "2:1#120#1=100,3:1#140#1=135");

    // The output is itself a valid token.
    let reparsed = SessionToken::parse(&result.to_string()).expect("round trip");
    assert_eq!(reparsed, result);
}

#[test]
fn test_session_target_narrows_the_candidate_set() {
    // Only candidates overlapping the requested sub-range participate.
    let candidates = vec![
        (range("", "A"), token("0", 1, 70)),
        (range("A", "M"), token("2", 1, 120)),
        (range("M", "FF"), token("3", 1, 140)),
    ];

    let result =
        latest_session_token(&candidates, &range("B", "C")).expect("target is covered");
    assert_eq!(result.to_string(), "2:1#120");
}

#[test]
fn test_session_multi_generation_chain() {
    // Two generations of splits: the middle generation's left child itself
    // split again. The finest chain reconstructs each parent in turn.
    let grandparent = (range("", "FF"), token("1", 1, 50));
    let left = (range("", "80"), token("2", 1, 200));
    let right = (range("80", "FF"), token("3", 1, 220));
    let left_left = (range("", "40"), token("4", 1, 300));
    let left_right = (range("40", "80"), token("5", 1, 310));

    let result = latest_session_token(
        &[grandparent, left, right, left_left, left_right],
        &range("", "FF"),
    )
    .expect("candidates overlap the target");

    // Every ancestor is behind its children, so only the leaves survive.
    let ids: Vec<&str> = result.parts().iter().map(|p| p.range_id.as_str()).collect();
    assert_eq!(ids, vec!["4", "5", "3"]);
}

#[test]
fn test_session_unrelated_partitions_stay_separate() {
    // Markers for disjoint partitions with no parent among the candidates
    // simply concatenate in key order.
    let candidates = vec![
        (range("M", "FF"), token("3", 1, 140)),
        (range("A", "M"), token("2", 1, 120)),
    ];

    let result =
        latest_session_token(&candidates, &range("A", "FF")).expect("candidates overlap");
    assert_eq!(result.to_string(), "2:1#120,3:1#140");
}

#[test]
fn test_session_no_candidate_for_target() {
    let candidates = vec![(range("", "A"), token("0", 1, 70))];
    assert!(latest_session_token(&candidates, &range("B", "C")).is_none());
}
