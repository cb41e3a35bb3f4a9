//! Process groups for collective reductions
//!
//! A process group is the set of cooperating ranks of a distributed run. The
//! timing report needs three things from it: this rank's id, the group size,
//! and blocking collectives where every rank contributes and every rank
//! receives the combined result.
//!
//! # Implementations
//!
//! - [`SoloGroup`]: a single process, collectives are identities
//! - [`local::LocalGroup`]: ranks are threads of one process, linked by channels
//! - [`tcp::TcpGroup`]: ranks are separate processes, linked over TCP through rank 0
//!
//! # Collective semantics
//!
//! Every rank must issue the same sequence of collectives. A rank that skips
//! one leaves the others blocked; there is no timeout on collectives.
//! Contributions are combined in rank order, so every rank receives a bitwise
//! identical result.

pub mod local;
pub mod protocol;
pub mod tcp;

pub use local::LocalGroup;
pub use protocol::Payload;
pub use tcp::TcpGroup;

use crate::Result;

/// Blocking collective operations over a group of ranks
pub trait ProcessGroup {
    /// This process's rank, in `0..size()`
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Sum `value` over all ranks; every rank receives the total
    fn all_reduce_sum(&self, value: f64) -> Result<f64>;

    /// Collect every rank's name list; result is indexed by rank
    fn all_gather_names(&self, names: &[String]) -> Result<Vec<Vec<String>>>;

    /// Whether this rank writes group-wide reports
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

/// Group containing only the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloGroup;

impl ProcessGroup for SoloGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        Ok(value)
    }

    fn all_gather_names(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        Ok(vec![names.to_vec()])
    }
}

/// Combine rank-ordered `Value` contributions into their sum
pub(crate) fn sum_values(contributions: Vec<Payload>) -> Result<Payload> {
    let mut total = 0.0;
    for (rank, payload) in contributions.into_iter().enumerate() {
        match payload {
            Payload::Value(value) => total += value,
            other => anyhow::bail!("rank {} sent {:?} to a sum reduction", rank, other),
        }
    }
    Ok(Payload::Value(total))
}

/// Combine rank-ordered `Names` contributions into one gathered list
pub(crate) fn gather_names(contributions: Vec<Payload>) -> Result<Payload> {
    let mut gathered = Vec::with_capacity(contributions.len());
    for (rank, payload) in contributions.into_iter().enumerate() {
        match payload {
            Payload::Names(names) => gathered.push(names),
            other => anyhow::bail!("rank {} sent {:?} to a name gather", rank, other),
        }
    }
    Ok(Payload::Gathered(gathered))
}

/// Unwrap a combined sum
pub(crate) fn expect_value(payload: Payload) -> Result<f64> {
    match payload {
        Payload::Value(value) => Ok(value),
        other => anyhow::bail!("expected a reduced value, got {:?}", other),
    }
}

/// Unwrap a combined gather
pub(crate) fn expect_gathered(payload: Payload) -> Result<Vec<Vec<String>>> {
    match payload {
        Payload::Gathered(lists) => Ok(lists),
        other => anyhow::bail!("expected gathered names, got {:?}", other),
    }
}
