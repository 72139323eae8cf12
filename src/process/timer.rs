//! # Restartable step countdown.
//!
//! [`StepTimer`] is the countdown most brewing steps use (mash rest, boil,
//! cold crash). It lives in the step context, so hooks and the run loop share
//! one timer. It runs on tokio's clock and therefore follows paused test time.
//!
//! ```text
//! start(d) ──► running ──► stop() ──► paused(remaining) ──► resume() ──► running
//!                 └──────── deadline reached ──► expired
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::select;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    paused: Option<Duration>,
}

/// Shared countdown timer of one step.
#[derive(Clone, Debug, Default)]
pub struct StepTimer {
    state: Arc<Mutex<TimerState>>,
}

impl StepTimer {
    /// Creates an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown.
    pub fn start(&self, duration: Duration) {
        let mut s = self.state.lock();
        s.deadline = Some(Instant::now() + duration);
        s.paused = None;
    }

    /// Pauses the countdown and returns the remaining time, if it was running.
    pub fn stop(&self) -> Option<Duration> {
        let mut s = self.state.lock();
        let remaining = s
            .deadline
            .take()
            .map(|d| d.saturating_duration_since(Instant::now()));
        if remaining.is_some() {
            s.paused = remaining;
        }
        remaining
    }

    /// Continues a paused countdown. Returns `false` if nothing was paused.
    pub fn resume(&self) -> bool {
        let mut s = self.state.lock();
        match s.paused.take() {
            Some(rem) => {
                s.deadline = Some(Instant::now() + rem);
                true
            }
            None => false,
        }
    }

    /// Returns `true` while the countdown runs (even if the deadline has passed).
    pub fn is_running(&self) -> bool {
        self.state.lock().deadline.is_some()
    }

    /// Returns `true` if the countdown runs and the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.state
            .lock()
            .deadline
            .is_some_and(|d| d <= Instant::now())
    }

    /// Time left: running → until deadline, paused → frozen value, idle → `None`.
    pub fn remaining(&self) -> Option<Duration> {
        let s = self.state.lock();
        match s.deadline {
            Some(d) => Some(d.saturating_duration_since(Instant::now())),
            None => s.paused,
        }
    }

    /// Waits until the deadline.
    ///
    /// Returns `true` when the deadline is reached, `false` if the timer is not
    /// running or `token` fires first. A restart while waiting moves the deadline.
    pub async fn wait(&self, token: &CancellationToken) -> bool {
        loop {
            let Some(deadline) = self.state.lock().deadline else {
                return false;
            };
            select! {
                biased;
                _ = token.cancelled() => return false,
                _ = time::sleep_until(deadline) => {
                    match self.state.lock().deadline {
                        Some(d) if d <= Instant::now() => return true,
                        Some(_) => continue,
                        None => return false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_countdown() {
        let t = StepTimer::new();
        assert!(!t.is_running());
        assert_eq!(t.remaining(), None);

        t.start(Duration::from_secs(60));
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(t.remaining(), Some(Duration::from_secs(40)));

        assert_eq!(t.stop(), Some(Duration::from_secs(40)));
        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(t.remaining(), Some(Duration::from_secs(40)));

        assert!(t.resume());
        assert!(t.wait(&CancellationToken::new()).await);
        assert!(t.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let t = StepTimer::new();
        t.start(Duration::from_secs(3600));
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            child.cancel();
        });
        assert!(!t.wait(&token).await);
        assert!(!t.is_expired());
    }
}
