//! Execution strategy for independent fits.
//!
//! Grid rows and polish segments are independent given a read-only match, so
//! they can be evaluated serially or with a rayon parallel map. Either way the
//! output is aligned with the input order.
//!
//! Two limits bound the work:
//! - [`CancelToken`]: checked before each item starts; items that never start
//!   come back as [`FitFailure::Cancelled`].
//! - [`FitLimits::deadline`]: a wall-clock budget per fit, polled by the
//!   optimizers every iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::FitFailure;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// One item after the other on the calling thread.
    #[default]
    Serial,
    /// Rayon parallel map over items.
    Parallel,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-fit resource limits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitLimits {
    pub deadline: Option<Duration>,
}

impl FitLimits {
    /// Start the clock for one fit.
    pub fn start(&self) -> Deadline {
        Deadline {
            end: self.deadline.map(|d| Instant::now() + d),
        }
    }
}

/// A running per-fit clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { end: None }
    }

    pub fn expired(&self) -> bool {
        self.end.is_some_and(|end| Instant::now() >= end)
    }
}

/// Apply `f` to every item, keeping input order.
pub fn map_ordered<T, R, F>(items: &[T], exec: Execution, cancel: &CancelToken, f: F) -> Vec<Result<R, FitFailure>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> Result<R, FitFailure> + Sync + Send,
{
    let run = |(i, item): (usize, &T)| {
        if cancel.is_cancelled() {
            return Err(FitFailure::Cancelled);
        }
        f(i, item)
    };

    match exec {
        Execution::Serial => items.iter().enumerate().map(run).collect(),
        Execution::Parallel => items.par_iter().enumerate().map(run).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_matches_serial_order() {
        let items: Vec<u64> = (0..200).collect();
        let cancel = CancelToken::new();
        let serial = map_ordered(&items, Execution::Serial, &cancel, |i, v| Ok((i, v * v)));
        let parallel = map_ordered(&items, Execution::Parallel, &cancel, |i, v| Ok((i, v * v)));
        assert_eq!(serial, parallel);
        assert_eq!(serial[17], Ok((17, 289)));
    }

    #[test]
    fn cancellation_marks_remaining_items() {
        let items: Vec<usize> = (0..5).collect();
        let cancel = CancelToken::new();
        let out = map_ordered(&items, Execution::Serial, &cancel, |_, v| {
            if *v == 1 {
                cancel.cancel();
            }
            Ok(*v)
        });
        assert_eq!(out[0], Ok(0));
        assert_eq!(out[1], Ok(1));
        assert!(out[2..].iter().all(|r| *r == Err(FitFailure::Cancelled)));
    }

    #[test]
    fn zero_deadline_expires_immediately() {
        let limits = FitLimits {
            deadline: Some(Duration::ZERO),
        };
        assert!(limits.start().expired());
        assert!(!FitLimits::default().start().expired());
        assert!(!Deadline::none().expired());
    }
}
