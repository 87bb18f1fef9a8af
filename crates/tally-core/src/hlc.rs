//! Hybrid logical clock.
//!
//! Issues timestamps for one node that are strictly increasing even when the
//! wall clock stalls or moves backwards, and that stay causally after every
//! remote timestamp the node has observed.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::error::ClockError;
use crate::timestamp::Timestamp;
use crate::types::NodeId;

/// Configuration for the hybrid logical clock.
#[derive(Debug, Clone)]
pub struct HlcConfig {
    /// How far ahead of the wall clock an issued or observed timestamp may run.
    pub max_drift_ms: u64,
}

impl Default for HlcConfig {
    fn default() -> Self {
        Self {
            max_drift_ms: 60_000,
        }
    }
}

/// Last issued `(millis, counter)`.
#[derive(Debug, Clone, Copy, Default)]
struct Last {
    millis: u64,
    counter: u16,
}

/// A hybrid logical clock bound to one node.
pub struct Hlc {
    node: NodeId,
    clock: Arc<dyn Clock>,
    config: HlcConfig,
    last: Mutex<Last>,
}

impl Hlc {
    /// Create a clock for `node`. The reserved cursor node id is rejected.
    pub fn new(node: NodeId, clock: Arc<dyn Clock>, config: HlcConfig) -> Result<Self, ClockError> {
        if node.is_reserved() {
            return Err(ClockError::ReservedNode(node));
        }
        Ok(Self {
            node,
            clock,
            config,
            last: Mutex::new(Last::default()),
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The most recently issued or observed position of this clock.
    pub fn last(&self) -> Timestamp {
        let last = self.lock();
        // Stored values already passed `Timestamp::new`.
        Timestamp::new(last.millis, last.counter, self.node).unwrap_or(Timestamp::ZERO)
    }

    /// Fast-forward to at least `ts` without drift checks.
    ///
    /// Used when reopening a replica so new timestamps sort after history
    /// already on disk.
    pub fn restore(&self, ts: &Timestamp) {
        let mut last = self.lock();
        if (ts.millis(), ts.counter()) > (last.millis, last.counter) {
            last.millis = ts.millis();
            last.counter = ts.counter();
        }
    }

    /// Issue a timestamp for a locally originated event.
    pub fn now(&self) -> Result<Timestamp, ClockError> {
        let wall = self.clock.now_millis();
        let mut last = self.lock();

        let millis = last.millis.max(wall);
        let counter = if millis == last.millis {
            last.counter
                .checked_add(1)
                .ok_or(ClockError::CounterOverflow { millis })?
        } else {
            0
        };
        self.check_drift(millis, wall)?;

        let ts = Timestamp::new(millis, counter, self.node)?;
        *last = Last { millis, counter };
        Ok(ts)
    }

    /// Merge a remote timestamp into the clock.
    ///
    /// Returns the new local position, which sorts after both the previous
    /// local position and `remote`.
    pub fn receive(&self, remote: &Timestamp) -> Result<Timestamp, ClockError> {
        if remote.node() == self.node {
            return Err(ClockError::DuplicateNode(self.node));
        }

        let wall = self.clock.now_millis();
        self.check_drift(remote.millis(), wall)?;

        let mut last = self.lock();
        let local = Timestamp::new(last.millis, last.counter, self.node)?;
        let ts = receive_remote(&local, remote, self.node, wall)?;
        self.check_drift(ts.millis(), wall)?;

        *last = Last {
            millis: ts.millis(),
            counter: ts.counter(),
        };
        Ok(ts)
    }

    fn check_drift(&self, millis: u64, wall: u64) -> Result<(), ClockError> {
        let drift_ms = millis.saturating_sub(wall);
        if drift_ms > self.config.max_drift_ms {
            tracing::warn!(drift_ms, max = self.config.max_drift_ms, "clock drift exceeded");
            return Err(ClockError::ClockDrift {
                drift_ms,
                max_drift_ms: self.config.max_drift_ms,
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Last> {
        // The guarded value is a plain pair that is written atomically.
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Hlc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hlc")
            .field("node", &self.node)
            .field("last", &*self.lock())
            .finish()
    }
}

/// Stateless receive rule.
///
/// `millis = max(local, wall, remote)`; the counter continues from whichever
/// side(s) already sit at that millis, or restarts at 0 when the wall clock
/// is ahead of both.
pub fn receive_remote(
    local: &Timestamp,
    remote: &Timestamp,
    node: NodeId,
    wall: u64,
) -> Result<Timestamp, ClockError> {
    let (lm, lc) = (local.millis(), local.counter());
    let (rm, rc) = (remote.millis(), remote.counter());
    let millis = lm.max(rm).max(wall);

    let next = |c: u16| c.checked_add(1).ok_or(ClockError::CounterOverflow { millis });
    let counter = if millis == lm && millis == rm {
        next(lc.max(rc))?
    } else if millis == lm {
        next(lc)?
    } else if millis == rm {
        next(rc)?
    } else {
        0
    };

    Ok(Timestamp::new(millis, counter, node)?)
}
