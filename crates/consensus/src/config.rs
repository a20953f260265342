//! Consensus configuration.

use meridian_types::{FeeVote, Hash};
use std::time::Duration;

/// Which convergence mechanism rounds use. Fixed for the process lifetime;
/// it never changes mid-round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsensusKind {
    /// The built-in threshold (avalanche) rule.
    #[default]
    Builtin,
    /// The external first-writer-wins arbiter.
    ExternalArbiter,
}

/// One band of the avalanche schedule: once the round has consumed
/// `consensus_time_pct` percent of the previous round's duration, a disputed
/// transaction needs `required_pct` percent yes votes to stay in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvalancheLevel {
    pub consensus_time_pct: u32,
    pub required_pct: u32,
}

/// The rising threshold schedule. Raising the bar over time forces stuck
/// disputes to resolve one way or the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvalancheSchedule {
    levels: Vec<AvalancheLevel>,
}

impl AvalancheSchedule {
    /// Levels must be sorted by `consensus_time_pct`, starting at 0.
    pub fn new(levels: Vec<AvalancheLevel>) -> Self {
        debug_assert!(!levels.is_empty());
        debug_assert!(levels.windows(2).all(|w| w[0].consensus_time_pct < w[1].consensus_time_pct));
        Self { levels }
    }

    /// The yes-vote percentage required at `close_percent` of the previous
    /// round's duration.
    pub fn required_pct(&self, close_percent: u32) -> u32 {
        self.levels
            .iter()
            .rev()
            .find(|level| close_percent >= level.consensus_time_pct)
            .map(|level| level.required_pct)
            .unwrap_or_else(|| self.levels[0].required_pct)
    }
}

impl Default for AvalancheSchedule {
    fn default() -> Self {
        Self::new(vec![
            AvalancheLevel { consensus_time_pct: 0, required_pct: 50 },
            AvalancheLevel { consensus_time_pct: 50, required_pct: 65 },
            AvalancheLevel { consensus_time_pct: 85, required_pct: 70 },
            AvalancheLevel { consensus_time_pct: 200, required_pct: 95 },
        ])
    }
}

/// Round engine configuration.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub kind: ConsensusKind,

    /// Cadence of the round tick driving the state machine.
    pub tick_interval: Duration,

    /// Minimum time in the establish phase before convergence may be
    /// declared; gives late proposals a chance to arrive.
    pub min_consensus: Duration,

    /// Minimum time the ledger stays open when local transactions exist.
    pub min_close: Duration,

    /// Close the ledger after this long since the previous close even with
    /// nothing to do.
    pub idle_interval: Duration,

    /// Percentage of proposers that must share our position to converge.
    pub converge_pct: u32,

    /// Percentage of proposers that must share a close-time bucket.
    pub close_time_converge_pct: u32,

    /// The rising dispute-vote threshold schedule.
    pub avalanche: AvalancheSchedule,

    /// Peer proposals older than this are swept and their votes retracted.
    pub propose_freshness: Duration,

    /// Minimum number of peer proposers before convergence can be declared,
    /// guarding against lonely agreement. Zero disables the guard.
    pub min_proposers: usize,

    /// Our fee vote, carried on flag ledgers.
    pub fee_vote: FeeVote,

    /// Amendments we vote for, carried on flag ledgers.
    pub amendments: Vec<Hash>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            kind: ConsensusKind::Builtin,
            tick_interval: Duration::from_secs(1),
            min_consensus: Duration::from_millis(1950),
            min_close: Duration::from_secs(2),
            idle_interval: Duration::from_secs(15),
            converge_pct: 80,
            close_time_converge_pct: 75,
            avalanche: AvalancheSchedule::default(),
            propose_freshness: Duration::from_secs(20),
            min_proposers: 0,
            fee_vote: FeeVote {
                base_fee: 10,
                reserve_base: 200_000_000,
                reserve_increment: 50_000_000,
            },
            amendments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_bands() {
        let schedule = AvalancheSchedule::default();
        assert_eq!(schedule.required_pct(0), 50);
        assert_eq!(schedule.required_pct(49), 50);
        assert_eq!(schedule.required_pct(50), 65);
        assert_eq!(schedule.required_pct(84), 65);
        assert_eq!(schedule.required_pct(85), 70);
        assert_eq!(schedule.required_pct(199), 70);
        assert_eq!(schedule.required_pct(200), 95);
        assert_eq!(schedule.required_pct(1000), 95);
    }
}
