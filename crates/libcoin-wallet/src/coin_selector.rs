//! Component I: `CoinSelector` — bounded subset-sum coin picking.
//!
//! Tries to pick a set of unspent outputs that covers a target value
//! while minimizing leftover change, with a bias toward a single exact
//! or near-exact output and away from leaving dust-sized change. The
//! stochastic subset-sum pass is the same shape whether it finds
//! anything or not: shuffle, look for an exact match, otherwise run a
//! bounded number of randomized trials and keep the best.

use libcoin_core::constants::CENT;
use libcoin_core::types::OutPoint;

use crate::rng::WalletRng;

/// Number of stochastic subset-sum trials to run when no exact or
/// single-output match is available.
const SELECTION_TRIALS: usize = 1000;

/// A candidate unspent output, already filtered for mine/final/spent.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub coin: OutPoint,
    pub value: u64,
}

/// `(confirmations required if from-me, confirmations required otherwise)`.
#[derive(Clone, Copy, Debug)]
pub struct ConfirmTiers(pub i32, pub i32);

/// The confirmation tiers tried in order, per spec: prefer well-confirmed
/// coins of our own, falling back to looser requirements if that leaves
/// nothing spendable.
pub const CONFIRM_TIERS: [ConfirmTiers; 3] = [ConfirmTiers(1, 6), ConfirmTiers(1, 1), ConfirmTiers(0, 1)];

/// Everything the selector needs to know about a coin beyond its value,
/// to decide eligibility under a confirmation tier.
pub struct CoinInfo {
    pub coin: OutPoint,
    pub value: u64,
    pub from_me: bool,
    pub depth: i32,
    pub is_coinbase: bool,
    pub blocks_to_maturity: i32,
}

/// Filter `coins` down to the candidates eligible under confirmation
/// tier `(c_mine, c_theirs)`.
pub fn eligible_candidates(coins: &[CoinInfo], tiers: ConfirmTiers) -> Vec<Candidate> {
    let ConfirmTiers(c_mine, c_theirs) = tiers;
    coins
        .iter()
        .filter(|c| !c.is_coinbase || c.blocks_to_maturity == 0)
        .filter(|c| {
            let required = if c.from_me { c_mine } else { c_theirs };
            c.depth >= required
        })
        .map(|c| Candidate { coin: c.coin, value: c.value })
        .collect()
}

/// Select a subset of `candidates` summing to at least `target`.
///
/// Returns `None` if no combination (including the single best
/// candidate) reaches `target`.
pub fn select_coins(candidates: &[Candidate], target: u64, rng: &mut dyn WalletRng) -> Option<Vec<Candidate>> {
    if candidates.is_empty() {
        return None;
    }

    let mut shuffled: Vec<Candidate> = candidates.to_vec();
    shuffle(&mut shuffled, rng);

    // Exact match short-circuits everything else.
    if let Some(exact) = shuffled.iter().find(|c| c.value == target) {
        return Some(vec![*exact]);
    }

    let upper = target.saturating_add(CENT);
    let mut smalls: Vec<Candidate> = Vec::new();
    let mut lowest_larger: Option<Candidate> = None;

    for c in &shuffled {
        if c.value < upper {
            smalls.push(*c);
        } else if lowest_larger.map_or(true, |best| c.value < best.value) {
            lowest_larger = Some(*c);
        }
    }

    let lower_total: u64 = smalls.iter().map(|c| c.value).sum();

    if lower_total == target || lower_total == upper {
        return Some(smalls);
    }

    let need_larger_margin = target + if lowest_larger.is_some() { CENT } else { 0 };
    if lower_total < need_larger_margin {
        return lowest_larger.map(|c| vec![c]);
    }

    let effective_target = if lower_total >= upper { upper } else { target };

    let subset = stochastic_subset_sum(&smalls, effective_target, rng);

    match (lowest_larger, subset) {
        (Some(single), Some(best_subset)) => {
            let best_total: u64 = best_subset.iter().map(|c| c.value).sum();
            let single_diff = single.value.abs_diff(target);
            let subset_diff = best_total.abs_diff(target);
            if single_diff <= subset_diff {
                Some(vec![single])
            } else {
                Some(best_subset)
            }
        }
        (Some(single), None) => Some(vec![single]),
        (None, Some(best_subset)) => Some(best_subset),
        (None, None) => None,
    }
}

/// 1,000-trial randomized subset-sum: each trial sorts `smalls`
/// descending, makes two coin-flip passes (first over all items, second
/// only re-considering items excluded in the first pass), and keeps the
/// smallest total that reaches `target`.
fn stochastic_subset_sum(smalls: &[Candidate], target: u64, rng: &mut dyn WalletRng) -> Option<Vec<Candidate>> {
    if smalls.is_empty() {
        return None;
    }
    let mut sorted = smalls.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut best: Option<Vec<Candidate>> = None;
    let mut best_total = u64::MAX;

    for _ in 0..SELECTION_TRIALS {
        let mut included = vec![false; sorted.len()];
        let mut total = 0u64;

        for (i, c) in sorted.iter().enumerate() {
            if rng.gen_bool(0.5) {
                included[i] = true;
                total += c.value;
            }
        }
        if total < target {
            for (i, c) in sorted.iter().enumerate() {
                if !included[i] && rng.gen_bool(0.5) {
                    included[i] = true;
                    total += c.value;
                }
            }
        }

        if total >= target && total < best_total {
            best_total = total;
            best = Some(
                sorted
                    .iter()
                    .zip(included.iter())
                    .filter(|(_, &inc)| inc)
                    .map(|(c, _)| *c)
                    .collect(),
            );
        }
    }

    best
}

fn shuffle(items: &mut [Candidate], rng: &mut dyn WalletRng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range_u64(0, (i + 1) as u64) as usize;
        items.swap(i, j);
    }
}
