//! Proof selection strategies (spec §4.D).

use cashu::{Amount, Proof};
use rand::seq::SliceRandom;

use crate::error::{Error, InsufficientBalanceContext};

/// The four selection strategies named in spec §4.D. The caller cannot
/// distinguish strategies by contract except for whether the resulting
/// sum is exactly the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Ascending by amount; include until the running sum reaches target.
    SmallestFirst,
    /// Descending by amount; include until the running sum reaches target.
    LargestFirst,
    /// Search for a subset summing exactly to target; falls back to
    /// smallest-first if none is found within the search bound.
    ExactMatch,
    /// Shuffle, then include until the running sum reaches target.
    Random,
}

/// A successful selection (spec §4.D).
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Proofs chosen to cover (at least) the target amount.
    pub selected: Vec<Proof>,
    /// Proofs left over, not selected.
    pub remaining: Vec<Proof>,
}

impl SelectionResult {
    /// Sum of `selected`.
    pub fn selected_amount(&self) -> Amount {
        self.selected.iter().map(|p| p.amount).fold(Amount::ZERO, |a, b| a + b)
    }
}

/// An upper bound on the subset-sum search `exact-match` performs before
/// it gives up and falls back to smallest-first (spec §4.D "must be
/// bounded").
const EXACT_MATCH_SEARCH_BOUND: usize = 4096;

/// Run a strategy over `proofs` for `target`. Returns
/// [`Error::InsufficientBalance`] with structured context when no
/// selection can reach `target` (spec §4.D, §7).
pub fn select(
    strategy: SelectionStrategy,
    proofs: &[Proof],
    target: Amount,
) -> Result<SelectionResult, Error> {
    if target == Amount::ZERO {
        return Ok(SelectionResult {
            selected: Vec::new(),
            remaining: proofs.to_vec(),
        });
    }

    let total: Amount = proofs.iter().map(|p| p.amount).fold(Amount::ZERO, |a, b| a + b);
    if total < target {
        return Err(insufficient_balance(proofs, target, total));
    }

    let result = match strategy {
        SelectionStrategy::SmallestFirst => select_ascending(proofs, target),
        SelectionStrategy::LargestFirst => select_descending(proofs, target),
        SelectionStrategy::ExactMatch => select_exact(proofs, target)
            .unwrap_or_else(|| select_ascending(proofs, target)),
        SelectionStrategy::Random => select_random(proofs, target),
    };

    Ok(result)
}

fn select_ascending(proofs: &[Proof], target: Amount) -> SelectionResult {
    let mut ordered: Vec<Proof> = proofs.to_vec();
    ordered.sort_by_key(|p| p.amount);
    accumulate(ordered, target)
}

fn select_descending(proofs: &[Proof], target: Amount) -> SelectionResult {
    let mut ordered: Vec<Proof> = proofs.to_vec();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.amount));
    accumulate(ordered, target)
}

fn select_random(proofs: &[Proof], target: Amount) -> SelectionResult {
    let mut shuffled: Vec<Proof> = proofs.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    accumulate(shuffled, target)
}

fn accumulate(ordered: Vec<Proof>, target: Amount) -> SelectionResult {
    let mut selected = Vec::new();
    let mut remaining = Vec::new();
    let mut sum = Amount::ZERO;

    for proof in ordered {
        if sum >= target {
            remaining.push(proof);
            continue;
        }
        sum += proof.amount;
        selected.push(proof);
    }

    SelectionResult { selected, remaining }
}

/// Exact subset-sum search, smallest-cardinality tie-break, bounded by
/// [`EXACT_MATCH_SEARCH_BOUND`] node visits.
fn select_exact(proofs: &[Proof], target: Amount) -> Option<SelectionResult> {
    let mut ordered: Vec<Proof> = proofs.to_vec();
    ordered.sort_by_key(|p| p.amount);

    let mut best: Option<Vec<usize>> = None;
    let mut visited = 0usize;

    fn search(
        ordered: &[Proof],
        index: usize,
        remaining_target: i128,
        chosen: &mut Vec<usize>,
        best: &mut Option<Vec<usize>>,
        visited: &mut usize,
    ) {
        if *visited >= EXACT_MATCH_SEARCH_BOUND {
            return;
        }
        *visited += 1;

        if remaining_target == 0 {
            if best.as_ref().map(|b| b.len()).unwrap_or(usize::MAX) > chosen.len() {
                *best = Some(chosen.clone());
            }
            return;
        }
        if index >= ordered.len() || remaining_target < 0 {
            return;
        }
        // Prune once we already beat the best found cardinality.
        if let Some(b) = best {
            if chosen.len() >= b.len() {
                return;
            }
        }

        // Include ordered[index].
        chosen.push(index);
        search(
            ordered,
            index + 1,
            remaining_target - ordered[index].amount.to_u64() as i128,
            chosen,
            best,
            visited,
        );
        chosen.pop();

        // Exclude ordered[index].
        search(ordered, index + 1, remaining_target, chosen, best, visited);
    }

    let mut chosen = Vec::new();
    search(
        &ordered,
        0,
        target.to_u64() as i128,
        &mut chosen,
        &mut best,
        &mut visited,
    );

    let indices = best?;
    let index_set: std::collections::HashSet<usize> = indices.into_iter().collect();
    let mut selected = Vec::new();
    let mut remaining = Vec::new();
    for (i, proof) in ordered.into_iter().enumerate() {
        if index_set.contains(&i) {
            selected.push(proof);
        } else {
            remaining.push(proof);
        }
    }
    Some(SelectionResult { selected, remaining })
}

fn insufficient_balance(proofs: &[Proof], target: Amount, available: Amount) -> Error {
    let mut counts: std::collections::BTreeMap<Amount, usize> = std::collections::BTreeMap::new();
    for p in proofs {
        *counts.entry(p.amount).or_insert(0) += 1;
    }
    Error::InsufficientBalance(InsufficientBalanceContext {
        requested: target,
        available,
        denomination_counts: counts.into_iter().collect(),
    })
}
