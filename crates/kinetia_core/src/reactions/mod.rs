//! Reaction registry, evaluators and the three scheduling policies.

pub mod apply;
pub mod detailed_balance;
pub mod events;
pub mod gillespie;
pub mod parser;
pub mod perform;
pub mod propensity;
pub mod registry;
pub mod uncontrolled;

pub use detailed_balance::{DetailedBalance, ReversibleReactionConfig, ReversibleKind};
pub use events::ReactionEvent;
pub use perform::{Educts, Products, ReactionLogic};
pub use registry::ReactionRegistry;

use serde::{Deserialize, Serialize};

/// How reactions within one time step are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    /// Independent firing probabilities, conflicts are not resolved.
    #[default]
    #[serde(alias = "uncontrolled")]
    UncontrolledApproximation,
    Gillespie,
    DetailedBalance,
}

/// Lifecycle of one scheduler pass, traced at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    CandidatesGathered,
    EventsResolved,
    Applied,
}

/// Outcome of one `react` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionReport {
    pub proposed: usize,
    pub accepted: usize,
}

impl ReactionReport {
    pub fn changed(&self) -> bool {
        self.accepted > 0
    }
}

pub(crate) fn trace_phase(policy: SchedulerPolicy, phase: SchedulerPhase, events: usize) {
    tracing::debug!(?policy, ?phase, events, "Reaction scheduler");
}
