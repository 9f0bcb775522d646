//! Random permutations without fixed points.
//!
//! Shuffles are drawn with Fisher–Yates and rejected until one has no fixed
//! point, which samples uniformly among all derangements. About 37% of
//! shuffles qualify, so the rejection loop is bounded; if every attempt
//! fails, the final shuffle is repaired by swapping each fixed point with its
//! cyclic successor.

use rand::seq::SliceRandom;
use rand::Rng;

const MAX_SHUFFLES: usize = 32;

/// Returns `p` such that `i` gives to `p[i]` and `p[i] != i` for every `i`.
///
/// `None` when fewer than two slots exist, since no derangement is possible.
pub fn derangement<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Option<Vec<usize>> {
    if n < 2 {
        return None;
    }

    let mut perm: Vec<usize> = (0..n).collect();
    for _ in 0..MAX_SHUFFLES {
        perm.shuffle(rng);
        if is_derangement(&perm) {
            return Some(perm);
        }
    }

    tracing::debug!(n, "rejection sampling exhausted, repairing last shuffle");
    repair_fixed_points(&mut perm);
    debug_assert!(is_derangement(&perm));
    Some(perm)
}

/// Single left-to-right pass: every slot still pointing at itself trades
/// targets with slot `(i + 1) % n`.
///
/// For `n >= 2` the result never has a fixed point. A swap at `i` moves the
/// value `i` into slot `i + 1`, which cannot then be fixed, and the wrap-around
/// swap at `n - 1` hands `n - 1` to slot 0. The output is not uniform.
pub fn repair_fixed_points(perm: &mut [usize]) {
    let n = perm.len();
    if n < 2 {
        return;
    }
    for i in 0..n {
        if perm[i] == i {
            perm.swap(i, (i + 1) % n);
        }
    }
}

/// True when `perm` is a permutation of `0..perm.len()` with no fixed point.
pub fn is_derangement(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for (i, &target) in perm.iter().enumerate() {
        if target == i || target >= perm.len() || seen[target] {
            return false;
        }
        seen[target] = true;
    }
    true
}
