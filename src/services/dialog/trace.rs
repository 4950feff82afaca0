//! Per-turn transition bookkeeping and the hop guard.

use crate::error::{Error, Result};

/// One transition taken during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

/// Records the transitions of a single turn and stops runaway loops.
///
/// Every transition counts as one hop. Exceeding `max_hops` in one turn fails
/// with [`Error::TransitionLoop`] carrying the visited path.
#[derive(Debug, Clone)]
pub struct TransitionTrace {
    max_hops: u32,
    origin: String,
    hops: Vec<Hop>,
}

impl TransitionTrace {
    pub fn new(max_hops: u32, origin: impl Into<String>) -> Self {
        Self {
            max_hops,
            origin: origin.into(),
            hops: Vec::new(),
        }
    }

    pub fn record(&mut self, to: impl Into<String>) -> Result<()> {
        let from = self
            .hops
            .last()
            .map(|hop| hop.to.clone())
            .unwrap_or_else(|| self.origin.clone());

        self.hops.push(Hop { from, to: to.into() });

        if self.hop_count() > self.max_hops {
            return Err(Error::TransitionLoop {
                hops: self.hop_count(),
                path: self.path(),
            });
        }
        Ok(())
    }

    pub fn hop_count(&self) -> u32 {
        u32::try_from(self.hops.len()).unwrap_or(u32::MAX)
    }

    pub fn has_moved(&self) -> bool {
        !self.hops.is_empty()
    }

    /// Origin followed by every destination, in order.
    pub fn path(&self) -> Vec<String> {
        std::iter::once(self.origin.clone())
            .chain(self.hops.iter().map(|hop| hop.to.clone()))
            .collect()
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }
}
