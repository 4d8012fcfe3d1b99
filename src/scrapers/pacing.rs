//! Pauses between browser actions.
//!
//! Every wait in the pipeline goes through a [`Sleeper`] so that tests can
//! observe the exact schedule without actually sleeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Maximum backoff delay (seconds).
const MAX_BACKOFF_SECS: u64 = 60;

/// Why the pipeline is pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseKind {
    /// Waiting before a navigation retry.
    Backoff,
    /// Politeness delay after a navigation.
    Request,
    /// Letting the page update after a click.
    Settle,
    /// Between detail pages.
    Record,
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, kind: PauseKind, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, kind: PauseKind, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        debug!("Pausing {:?} ({:?})", duration, kind);
        tokio::time::sleep(duration).await;
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<(PauseKind, Duration)>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    pub fn pauses(&self) -> Vec<(PauseKind, Duration)> {
        self.pauses.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Durations of the pauses of one kind.
    pub fn of_kind(&self, kind: PauseKind) -> Vec<Duration> {
        self.pauses()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, d)| d)
            .collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, kind: PauseKind, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push((kind, duration));
        }
    }
}

/// Exponential backoff after the `failures`-th consecutive failure:
/// `base * 2^(failures - 1)`, capped at one minute.
pub fn backoff_delay(failures: u32, base: Duration) -> Duration {
    let factor = 2u32.saturating_pow(failures.saturating_sub(1));
    base.saturating_mul(factor)
        .min(Duration::from_secs(MAX_BACKOFF_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(8));
        assert_eq!(backoff_delay(12, base), Duration::from_secs(60)); // capped
        assert_eq!(backoff_delay(40, base), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_recording_sleeper_keeps_order() {
        let sleeper = RecordingSleeper::new();
        let shared = sleeper.clone();
        shared.sleep(PauseKind::Backoff, Duration::from_secs(2)).await;
        shared.sleep(PauseKind::Request, Duration::from_secs(1)).await;
        shared.sleep(PauseKind::Backoff, Duration::from_secs(4)).await;

        assert_eq!(sleeper.pauses().len(), 3);
        assert_eq!(
            sleeper.of_kind(PauseKind::Backoff),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }
}
