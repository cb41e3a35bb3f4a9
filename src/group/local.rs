//! In-process group: one rank per thread
//!
//! Every rank owns an inbox and a sender into every other rank's inbox. A
//! collective broadcasts this rank's contribution, then waits for one
//! contribution from each peer. Contributions carry a sequence number because
//! a fast peer may already be one collective ahead; its early message is
//! parked until this rank reaches the same collective.
//!
//! A handle announces its departure to every peer when dropped (including
//! during a panic). A rank waiting on a contribution that a departed peer
//! never sent fails instead of blocking.
//!
//! # Example
//!
//! ```
//! use geotally::group::{LocalGroup, ProcessGroup};
//!
//! let totals = LocalGroup::run_ranks(3, |group| {
//!     group.all_reduce_sum(group.rank() as f64 + 1.0)
//! })?;
//! assert_eq!(totals, vec![6.0, 6.0, 6.0]);
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::{expect_gathered, expect_value, gather_names, sum_values, Payload, ProcessGroup};
use crate::Result;
use anyhow::Context;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::cell::{Cell, RefCell};

/// One rank's contribution to a collective
#[derive(Debug, Clone)]
struct Contribution {
    seq: u64,
    from: usize,
    payload: Payload,
}

/// Message delivered to a rank's inbox
#[derive(Debug)]
enum Envelope {
    Contribution(Contribution),
    /// The sender dropped its handle; it sends nothing after this
    Departed { from: usize },
}

/// Handle for one rank of an in-process group
///
/// Handles are `Send` but not `Sync`: move each one into the thread acting
/// as that rank.
pub struct LocalGroup {
    rank: usize,
    size: usize,
    /// Senders into every other rank's inbox; `None` at this rank's index
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    seq: Cell<u64>,
    early: RefCell<Vec<Contribution>>,
    departed: RefCell<Vec<bool>>,
}

impl LocalGroup {
    /// Create the handles of a group of `size` ranks, indexed by rank
    pub fn spawn(size: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                inbox,
                seq: Cell::new(0),
                early: RefCell::new(Vec::new()),
                departed: RefCell::new(vec![false; size]),
            })
            .collect()
    }

    /// Run `body` once per rank, each on its own thread, and collect the results by rank
    pub fn run_ranks<T, F>(size: usize, body: F) -> Result<Vec<T>>
    where
        F: Fn(LocalGroup) -> Result<T> + Sync,
        T: Send,
    {
        let groups = Self::spawn(size);
        let body = &body;

        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| scope.spawn(move || body(group)))
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .map_err(|_| anyhow::anyhow!("rank {} panicked", rank))?
                        .with_context(|| format!("rank {} failed", rank))
                })
                .collect()
        })
    }

    /// Exchange one contribution with every rank and combine them in rank order
    fn collective(&self, payload: Payload, combine: fn(Vec<Payload>) -> Result<Payload>) -> Result<Payload> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);

        for (peer, sender) in self.peers.iter().enumerate() {
            let Some(sender) = sender else { continue };
            sender
                .send(Envelope::Contribution(Contribution {
                    seq,
                    from: self.rank,
                    payload: payload.clone(),
                }))
                .map_err(|_| anyhow::anyhow!("rank {} has left the group", peer))?;
        }

        let mut slots: Vec<Option<Payload>> = vec![None; self.size];
        slots[self.rank] = Some(payload);
        let mut filled = 1;

        // Contributions that arrived while this rank was still in the previous collective
        let parked: Vec<Contribution> = std::mem::take(&mut *self.early.borrow_mut());
        for contribution in parked {
            if contribution.seq == seq {
                place(&mut slots, contribution)?;
                filled += 1;
            } else {
                self.early.borrow_mut().push(contribution);
            }
        }

        // A departed peer's contributions all arrived before its notice
        if let Some(peer) = self.missing_departed(&slots) {
            anyhow::bail!("rank {} has left the group", peer);
        }

        while filled < self.size {
            let envelope = self
                .inbox
                .recv()
                .context("group channel closed before the collective completed")?;

            let contribution = match envelope {
                Envelope::Contribution(contribution) => contribution,
                Envelope::Departed { from } => {
                    if let Some(flag) = self.departed.borrow_mut().get_mut(from) {
                        *flag = true;
                    }
                    if slots.get(from).map_or(false, Option::is_none) {
                        anyhow::bail!("rank {} has left the group", from);
                    }
                    continue;
                }
            };

            if contribution.seq == seq {
                place(&mut slots, contribution)?;
                filled += 1;
            } else if contribution.seq > seq {
                self.early.borrow_mut().push(contribution);
            } else {
                anyhow::bail!(
                    "rank {} received a stale contribution from rank {} (seq {} < {})",
                    self.rank,
                    contribution.from,
                    contribution.seq,
                    seq
                );
            }
        }

        let contributions = slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| slot.with_context(|| format!("missing contribution from rank {}", rank)))
            .collect::<Result<Vec<_>>>()?;

        combine(contributions)
    }

    /// First departed peer whose slot is still empty
    fn missing_departed(&self, slots: &[Option<Payload>]) -> Option<usize> {
        self.departed
            .borrow()
            .iter()
            .zip(slots)
            .position(|(gone, slot)| *gone && slot.is_none())
    }
}

impl Drop for LocalGroup {
    fn drop(&mut self) {
        for sender in self.peers.iter().flatten() {
            // Peers that already left have no inbox to notify
            let _ = sender.send(Envelope::Departed { from: self.rank });
        }
    }
}

fn place(slots: &mut [Option<Payload>], contribution: Contribution) -> Result<()> {
    let slot = slots
        .get_mut(contribution.from)
        .with_context(|| format!("contribution from unknown rank {}", contribution.from))?;
    if slot.is_some() {
        anyhow::bail!("rank {} contributed twice to one collective", contribution.from);
    }
    *slot = Some(contribution.payload);
    Ok(())
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        expect_value(self.collective(Payload::Value(value), sum_values)?)
    }

    fn all_gather_names(&self, names: &[String]) -> Result<Vec<Vec<String>>> {
        expect_gathered(self.collective(Payload::Names(names.to_vec()), gather_names)?)
    }
}
