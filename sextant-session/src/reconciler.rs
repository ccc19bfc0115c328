//! Session token reconciliation across topology changes.
//!
//! Tokens are recorded against the partition layout the writer saw, which
//! may predate or postdate a split. Reconciling them for a target range
//! therefore matches on key ranges, never on partition range ids.

use sextant_core::KeyRange;

use crate::token::{RangeToken, SessionToken};

/// Produces the single token reflecting "at least as fresh as every input
/// whose range overlaps the target".
///
/// Candidate ranges and the target are normalized before matching. A parent
/// range whose cover is exactly reconstructible from sibling candidates is
/// collapsed: the side with the greater global progress wins, and a mixed
/// outcome conservatively keeps both as a compound token. Compound input
/// tokens are never split apart during that matching; they pass through and
/// are folded in at the end.
///
/// Returns `None` when no candidate overlaps the target.
#[must_use]
pub fn latest_session_token(
    candidates: &[(KeyRange, SessionToken)],
    target: &KeyRange,
) -> Option<SessionToken> {
    let target = target.normalize();

    // Keep only candidates whose normalized range overlaps the target.
    let mut entries: Vec<(KeyRange, SessionToken)> = candidates
        .iter()
        .filter_map(|(range, token)| {
            let normalized = range.normalize();
            normalized
                .overlaps(&target)
                .then(|| (normalized, token.clone()))
        })
        .collect();
    if entries.is_empty() {
        return None;
    }

    // Merge candidates observed twice against the same physical partition.
    entries.sort_by(|a, b| a.0.min.cmp(&b.0.min).then_with(|| a.0.max.cmp(&b.0.max)));
    let mut merged: Vec<(KeyRange, SessionToken)> = Vec::with_capacity(entries.len());
    for (range, token) in entries {
        match merged.last_mut() {
            Some((last_range, last_token)) if *last_range == range => {
                *last_token = merge_equal_range_tokens(last_token, token);
            }
            _ => merged.push((range, token)),
        }
    }

    // Collapse split/merge topology shifts until none remain.
    while let Some((parent_index, child_indices)) = find_reconstructible(&merged) {
        collapse(&mut merged, parent_index, &child_indices);
    }

    // Flatten the survivors and merge markers that now share a range id.
    let parts = merge_parts(merged.into_iter().flat_map(|(_, token)| token.into_parts()));
    Some(SessionToken::compound(parts))
}

/// Merges two tokens recorded against the same partition range. Single
/// markers merge directly (ids may have drifted across a split); anything
/// involving a compound token merges part lists by id.
fn merge_equal_range_tokens(a: &SessionToken, b: SessionToken) -> SessionToken {
    if !a.is_compound() && !b.is_compound() {
        return SessionToken::single(a.parts()[0].merge(&b.parts()[0]));
    }
    SessionToken::compound(merge_parts(
        a.parts().iter().cloned().chain(b.into_parts()),
    ))
}

/// Folds markers into a list where each range id appears once, merging
/// collisions.
fn merge_parts(parts: impl IntoIterator<Item = RangeToken>) -> Vec<RangeToken> {
    let mut out: Vec<RangeToken> = Vec::new();
    for part in parts {
        match out
            .iter_mut()
            .find(|existing| existing.range_id == part.range_id)
        {
            Some(existing) => *existing = existing.merge(&part),
            None => out.push(part),
        }
    }
    out
}

/// Finds a single-marker candidate whose range is exactly the union of two
/// or more other single-marker candidates: contiguous subsets spanning the
/// parent's bounds. Compound candidates never participate.
///
/// Where several subsets start at the same boundary, the narrowest is
/// preferred; that walks the finest recorded partition chain.
fn find_reconstructible(entries: &[(KeyRange, SessionToken)]) -> Option<(usize, Vec<usize>)> {
    for (parent_index, (parent_range, parent_token)) in entries.iter().enumerate() {
        if parent_token.is_compound() {
            continue;
        }
        let subsets: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(index, (range, token))| {
                *index != parent_index
                    && !token.is_compound()
                    && range != parent_range
                    && range.is_subset(parent_range)
            })
            .map(|(index, _)| index)
            .collect();
        if subsets.len() < 2 {
            continue;
        }

        // Walk a contiguous chain from the parent's min to its max.
        let mut chain: Vec<usize> = Vec::new();
        let mut cursor: &str = parent_range.min.as_str();
        loop {
            let next = subsets
                .iter()
                .filter(|&&index| entries[index].0.min == cursor)
                .min_by(|&&a, &&b| entries[a].0.max.cmp(&entries[b].0.max));
            let Some(&index) = next else { break };
            chain.push(index);
            cursor = entries[index].0.max.as_str();
            if cursor == parent_range.max {
                if chain.len() >= 2 {
                    return Some((parent_index, chain));
                }
                break;
            }
        }
    }
    None
}

/// Resolves a reconstructed parent against its children by comparing global
/// progress: the fresher side wins, and a mixed outcome keeps both as one
/// compound candidate covering the parent's range.
fn collapse(
    entries: &mut Vec<(KeyRange, SessionToken)>,
    parent_index: usize,
    child_indices: &[usize],
) {
    let parent_global = entries[parent_index].1.parts()[0].vector.global_lsn();
    let child_globals: Vec<i64> = child_indices
        .iter()
        .map(|&index| entries[index].1.parts()[0].vector.global_lsn())
        .collect();

    if child_globals.iter().all(|&global| global >= parent_global) {
        // Every child is at least as advanced: the parent is stale.
        entries.remove(parent_index);
        return;
    }
    if child_globals.iter().all(|&global| parent_global >= global) {
        // The parent is at least as advanced as every child.
        let mut doomed = child_indices.to_vec();
        doomed.sort_unstable();
        for index in doomed.iter().rev() {
            entries.remove(*index);
        }
        return;
    }

    // Mixed: some children ahead, some behind. Keep both sides as one
    // compound candidate over the parent's range.
    let parent_range = entries[parent_index].0.clone();
    let mut parts: Vec<RangeToken> = child_indices
        .iter()
        .flat_map(|&index| entries[index].1.parts().iter().cloned())
        .collect();
    parts.push(entries[parent_index].1.parts()[0].clone());
    let parts = merge_parts(parts);

    let mut doomed = child_indices.to_vec();
    doomed.push(parent_index);
    doomed.sort_unstable();
    for index in doomed.iter().rev() {
        entries.remove(*index);
    }
    entries.push((parent_range, SessionToken::compound(parts)));
    entries.sort_by(|a, b| a.0.min.cmp(&b.0.min).then_with(|| a.0.max.cmp(&b.0.max)));
}
