//! Close and convergence decision functions.
//!
//! Pure functions over observed counts and elapsed times; the round state
//! machine supplies the inputs each tick.

use tracing::{debug, warn};

/// Timings outside this window are treated as clock trouble.
const SANE_ROUND_MS: std::ops::Range<i64> = -1_000..600_000;

/// How many participants are needed to reach `pct` percent (rounded up).
pub fn participants_needed(participants: usize, pct: u32) -> usize {
    (participants * pct as usize).div_ceil(100)
}

/// Decide whether to close the open ledger and begin consensus on it.
///
/// * `since_close_ms` - time since the previous ledger's close time (may be
///   negative when our clock runs ahead of the network's).
/// * `open_ms` - time this ledger has been open.
#[allow(clippy::too_many_arguments)]
pub fn should_close_ledger(
    any_transactions: bool,
    prev_proposers: usize,
    proposers_closed: usize,
    proposers_validated: usize,
    prev_round_ms: u64,
    since_close_ms: i64,
    open_ms: u64,
    idle_interval_ms: u64,
    min_close_ms: u64,
) -> bool {
    // A negative since-close is normal: close times round to resolution and
    // may land ahead of our clock. Only a huge gap or a nonsense previous
    // round duration means clock trouble.
    if !SANE_ROUND_MS.contains(&(prev_round_ms as i64)) || since_close_ms > SANE_ROUND_MS.end {
        warn!(
            prev_round_ms,
            since_close_ms, "Closing ledger despite implausible timings"
        );
        return true;
    }

    if proposers_closed + proposers_validated > prev_proposers / 2 {
        // Enough peers have closed or moved on; we are falling behind.
        debug!(
            proposers_closed,
            proposers_validated, "Closing because peers have closed"
        );
        return true;
    }

    if !any_transactions {
        // Only close at the idle interval.
        return since_close_ms >= idle_interval_ms as i64;
    }

    if open_ms < min_close_ms {
        // Give transactions time to accumulate before closing.
        return false;
    }

    true
}

/// Decide whether the network has converged on our position.
///
/// * `current_agree` counts proposers sharing our position, ourselves
///   included when proposing.
/// * `current_finished` counts proposers whose validations show they moved
///   on to a successor ledger.
#[allow(clippy::too_many_arguments)]
pub fn check_consensus(
    prev_proposers: usize,
    current_proposers: usize,
    current_agree: usize,
    current_finished: usize,
    prev_round_ms: u64,
    elapsed_ms: u64,
    min_consensus_ms: u64,
    converge_pct: u32,
    min_proposers: usize,
) -> bool {
    if elapsed_ms <= min_consensus_ms {
        return false;
    }

    if current_proposers < prev_proposers * 3 / 4 {
        // Significantly fewer proposers than the last round; wait longer for
        // them to appear.
        if elapsed_ms < prev_round_ms + min_consensus_ms {
            debug!(current_proposers, prev_proposers, "Waiting for more proposers");
            return false;
        }
    }

    if current_proposers < min_proposers {
        return false;
    }

    let agree_pct = (current_agree * 100) / (current_proposers + 1);
    if agree_pct > converge_pct as usize {
        debug!(agree_pct, "Converged");
        return true;
    }

    if current_finished > current_proposers / 2 {
        // The network has moved on without us; concede the round.
        warn!(current_finished, current_proposers, "Network moved on");
        return true;
    }

    false
}
