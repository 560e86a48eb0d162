//! # Quorum Waiter
//!
//! Holds the participant in the waiting room until enough participants are
//! working.
//!
//! ```text
//! Uninitialized ──► PollingQuorumSize ──► PollingReadiness ──► Advancing
//!                        │   ▲                 │   ▲
//!                        └───┘ (retry)         └───┘ (ready < quorum)
//! ```
//!
//! Each call to [`QuorumWaiter::tick`] performs one step; [`QuorumWaiter::wait`]
//! drives ticks at a fixed interval until the waiter advances.

use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{ExperimentApi, Summary};
use crate::screen::{Screen, ScreenEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuorumPhase {
    #[default]
    Uninitialized,
    PollingQuorumSize,
    PollingReadiness {
        quorum: u32,
    },
    Advancing,
}

/// One readiness reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumProgress {
    pub ready: u32,
    pub quorum: u32,
    pub percent: u32,
}

impl QuorumProgress {
    pub fn new(ready: u32, quorum: u32) -> Self {
        let percent = if quorum == 0 {
            100
        } else {
            (f64::from(ready) / f64::from(quorum) * 100.0).round() as u32
        };
        Self {
            ready,
            quorum,
            percent,
        }
    }

    pub fn is_met(&self) -> bool {
        self.ready >= self.quorum
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumTick {
    /// The quorum size is still unknown.
    AwaitingQuorum,
    /// Readiness observed, not enough yet.
    Waiting(QuorumProgress),
    /// Readiness met the quorum; the waiter is done.
    Advance(QuorumProgress),
    /// A readiness poll failed; nothing changed.
    Failed,
}

/// Quorum state for the waiting room. Only this type mutates it.
#[derive(Debug, Default)]
pub struct QuorumWaiter {
    phase: QuorumPhase,
    last: Option<QuorumProgress>,
}

impl QuorumWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> QuorumPhase {
        self.phase
    }

    /// Target quorum, once fetched.
    pub fn quorum(&self) -> Option<u32> {
        match self.phase {
            QuorumPhase::PollingReadiness { quorum } => Some(quorum),
            QuorumPhase::Advancing => self.last.map(|p| p.quorum),
            _ => None,
        }
    }

    pub fn last_progress(&self) -> Option<QuorumProgress> {
        self.last
    }

    /// Record the fetched quorum size.
    pub fn observe_quorum(&mut self, quorum: u32) {
        if matches!(
            self.phase,
            QuorumPhase::Uninitialized | QuorumPhase::PollingQuorumSize
        ) {
            self.phase = QuorumPhase::PollingReadiness { quorum };
        }
    }

    /// Fold a readiness summary into the state. A summary without a
    /// `working` entry counts as nobody ready.
    pub fn observe_summary(&mut self, summary: &Summary) -> QuorumTick {
        let QuorumPhase::PollingReadiness { quorum } = self.phase else {
            return QuorumTick::AwaitingQuorum;
        };
        let ready = summary.ready().unwrap_or_else(|e| {
            debug!(error = %e, "treating missing status as zero ready");
            0
        });
        let progress = QuorumProgress::new(ready, quorum);
        self.last = Some(progress);
        if progress.is_met() {
            self.phase = QuorumPhase::Advancing;
            QuorumTick::Advance(progress)
        } else {
            QuorumTick::Waiting(progress)
        }
    }

    /// Perform one polling step against `api`.
    pub async fn tick<A: ExperimentApi>(&mut self, api: &A) -> QuorumTick {
        match self.phase {
            QuorumPhase::Uninitialized | QuorumPhase::PollingQuorumSize => {
                self.phase = QuorumPhase::PollingQuorumSize;
                match api.quorum().await {
                    Ok(quorum) => {
                        debug!(quorum, "quorum size known");
                        self.observe_quorum(quorum);
                    }
                    Err(e) => warn!(error = %e, "quorum fetch failed, will retry next tick"),
                }
                QuorumTick::AwaitingQuorum
            }
            QuorumPhase::PollingReadiness { .. } => match api.summary().await {
                Ok(summary) => self.observe_summary(&summary),
                Err(e) => {
                    warn!(error = %e, "summary poll failed, will retry next tick");
                    QuorumTick::Failed
                }
            },
            QuorumPhase::Advancing => match self.last {
                Some(progress) => QuorumTick::Advance(progress),
                None => QuorumTick::AwaitingQuorum,
            },
        }
    }

    /// Tick every `interval` until the quorum is met, reporting progress on
    /// `screen`. Never gives up; cancel by dropping the future.
    pub async fn wait<A: ExperimentApi>(
        &mut self,
        api: &A,
        screen: &Screen,
        interval: Duration,
    ) -> QuorumProgress {
        loop {
            match self.tick(api).await {
                QuorumTick::Advance(progress) => {
                    screen.show(ScreenEvent::Progress(progress.percent));
                    return progress;
                }
                QuorumTick::Waiting(progress) => {
                    screen.show(ScreenEvent::Progress(progress.percent));
                }
                QuorumTick::AwaitingQuorum | QuorumTick::Failed => {}
            }
            tokio::time::sleep(interval).await;
        }
    }
}
