//! Shared quota state for all workers.
//!
//! The active credential, the latest [`QuotaSnapshot`] and the global pause
//! deadline are owned by a single [`QuotaCoordinator`] behind a mutex. The
//! mutex is never held across an `.await`.
//!
//! Rotation is generation-checked: a worker may only rotate away from the
//! credential it actually used. When many in-flight requests come back with
//! the same exhausted quota, the first one rotates and the rest see a newer
//! generation and leave the rotator alone.

use std::sync::{Mutex, MutexGuard, PoisonError};

use armory_api_models::{Credential, QuotaSnapshot};
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::credentials::CredentialRotator;
use crate::governor::{Action, RateGovernor};

/// The credential a request was sent with, tagged with the rotation
/// generation it was leased under.
#[derive(Debug, Clone)]
pub struct CredentialLease {
    /// Credential to attach to the request.
    pub credential: Credential,
    /// Rotation generation at lease time.
    pub generation: u64,
}

struct State {
    rotator: CredentialRotator,
    generation: u64,
    latest: Option<QuotaSnapshot>,
    paused_until: Option<Instant>,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Single coordination point for credential rotation and quota pauses.
pub struct QuotaCoordinator {
    governor: RateGovernor,
    clock: Clock,
    state: Mutex<State>,
}

impl QuotaCoordinator {
    /// Creates a coordinator using the wall clock.
    #[must_use]
    pub fn new(rotator: CredentialRotator, governor: RateGovernor) -> Self {
        Self {
            governor,
            clock: Box::new(Utc::now),
            state: Mutex::new(State {
                rotator,
                generation: 0,
                latest: None,
                paused_until: None,
            }),
        }
    }

    /// Replaces the wall clock used for minute-boundary calculations.
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases the active credential for one request.
    #[must_use]
    pub fn lease(&self) -> CredentialLease {
        let state = self.state();
        CredentialLease {
            credential: state.rotator.current().clone(),
            generation: state.generation,
        }
    }

    /// Records `snapshot` as the latest telemetry and applies the
    /// governor's decision.
    ///
    /// A pause extends the global deadline (it never shortens it). A
    /// rotation only advances the rotator if `lease` is still current.
    pub fn observe(&self, lease: &CredentialLease, snapshot: QuotaSnapshot) -> Action {
        let action = self.governor.observe_at(&snapshot, (self.clock)());
        let mut state = self.state();
        state.latest = Some(snapshot);

        if let Some(pause) = action.pause() {
            let deadline = Instant::now() + pause;
            if state.paused_until.is_none_or(|d| d < deadline) {
                log::info!(
                    "Rate window saturated ({}/{}), pausing for {pause:?} until the next minute",
                    snapshot.rate_current,
                    snapshot.rate_max,
                );
                state.paused_until = Some(deadline);
            }
        }

        if action.rotates() {
            if state.generation == lease.generation {
                let previous = state.rotator.current().masked();
                let next = state.rotator.rotate().masked();
                state.generation += 1;
                log::warn!(
                    "Plan quota exhausted ({}/{}) on {previous}, switching to {next}",
                    snapshot.total_current,
                    snapshot.total_max,
                );
            } else {
                log::debug!(
                    "Quota exhaustion reported for stale credential generation {} (now {}), not rotating",
                    lease.generation,
                    state.generation,
                );
            }
        }

        action
    }

    /// Waits until the global pause deadline (if any) has passed.
    pub async fn wait_for_window(&self) {
        loop {
            let deadline = self.state().paused_until;
            match deadline {
                Some(deadline) if deadline > Instant::now() => {
                    tokio::time::sleep_until(deadline).await;
                }
                _ => return,
            }
        }
    }

    /// The most recently observed quota telemetry.
    #[must_use]
    pub fn latest_quota(&self) -> Option<QuotaSnapshot> {
        self.state().latest
    }

    /// Index of the active credential.
    #[must_use]
    pub fn active_index(&self) -> usize {
        self.state().rotator.active_index()
    }

    /// Number of configured credentials.
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.state().rotator.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone as _;

    use super::*;

    fn coordinator(keys: &[&str]) -> QuotaCoordinator {
        let credentials = keys.iter().map(|k| Credential::api_key(*k)).collect();
        QuotaCoordinator::new(
            CredentialRotator::new(credentials).unwrap(),
            RateGovernor::default(),
        )
    }

    const EXHAUSTED: QuotaSnapshot = QuotaSnapshot {
        rate_current: 1,
        rate_max: 100,
        total_current: 999,
        total_max: 1000,
    };

    const HEALTHY: QuotaSnapshot = QuotaSnapshot {
        rate_current: 1,
        rate_max: 100,
        total_current: 10,
        total_max: 1000,
    };

    #[test]
    fn exhausted_quota_rotates_to_next_credential() {
        let coordinator = coordinator(&["A", "B"]);
        let lease = coordinator.lease();
        assert_eq!(lease.credential.secret(), "A");

        let action = coordinator.observe(&lease, EXHAUSTED);
        assert_eq!(action, Action::RotateCredential);
        assert_eq!(coordinator.lease().credential.secret(), "B");
        assert_eq!(coordinator.latest_quota(), Some(EXHAUSTED));
    }

    #[test]
    fn rotation_wraps_to_first() {
        let coordinator = coordinator(&["A", "B"]);
        coordinator.observe(&coordinator.lease(), EXHAUSTED);
        coordinator.observe(&coordinator.lease(), EXHAUSTED);
        assert_eq!(coordinator.lease().credential.secret(), "A");
    }

    #[test]
    fn stale_leases_do_not_double_rotate() {
        let coordinator = coordinator(&["A", "B", "C"]);
        let leases: Vec<_> = (0..5).map(|_| coordinator.lease()).collect();
        for lease in &leases {
            coordinator.observe(lease, EXHAUSTED);
        }
        assert_eq!(coordinator.active_index(), 1);
    }

    #[test]
    fn concurrent_observers_rotate_once() {
        let coordinator = Arc::new(coordinator(&["A", "B", "C", "D"]));
        let lease = coordinator.lease();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let lease = lease.clone();
                std::thread::spawn(move || {
                    coordinator.observe(&lease, EXHAUSTED);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(coordinator.active_index(), 1);
    }

    #[test]
    fn healthy_quota_keeps_credential() {
        let coordinator = coordinator(&["A", "B"]);
        let action = coordinator.observe(&coordinator.lease(), HEALTHY);
        assert_eq!(action, Action::Continue);
        assert_eq!(coordinator.active_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_rate_pauses_until_minute_boundary() {
        let coordinator = coordinator(&["A"]).with_clock(|| {
            Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 58).unwrap()
        });
        let saturated = QuotaSnapshot {
            rate_current: 100,
            ..HEALTHY
        };

        let action = coordinator.observe(&coordinator.lease(), saturated);
        assert_eq!(action, Action::Pause(Duration::from_secs(2)));

        let start = Instant::now();
        coordinator.wait_for_window().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn no_pause_returns_immediately() {
        let coordinator = coordinator(&["A"]);
        let start = Instant::now();
        coordinator.wait_for_window().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
