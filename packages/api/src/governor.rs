//! Soft-limit rate governance from quota telemetry.
//!
//! The API does not send a retry-after value when a plan approaches its
//! limits, only current/allotted counters. The rate window resets on whole
//! minute boundaries, so a saturated rate window pauses until the next
//! minute tick. A saturated plan quota rotates to the next credential.
//! Both can fire on the same response.

use std::time::Duration;

use armory_api_models::QuotaSnapshot;
use chrono::{DateTime, Utc};

/// Added to the reported rate counter to cover in-flight requests the
/// server has not counted yet.
pub const DEFAULT_RATE_MARGIN: u64 = 2;

/// Added to the reported plan-quota counter for the same reason.
pub const DEFAULT_TOTAL_MARGIN: u64 = 5;

const MINUTE_MS: i64 = 60_000;

/// What the pipeline should do after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Both windows have headroom.
    Continue,
    /// The rate window is saturated; wait this long.
    Pause(Duration),
    /// The plan quota is exhausted; switch credentials.
    RotateCredential,
    /// Both of the above.
    PauseAndRotate(Duration),
}

impl Action {
    /// The pause requested by this action, if any.
    #[must_use]
    pub const fn pause(self) -> Option<Duration> {
        match self {
            Self::Pause(d) | Self::PauseAndRotate(d) => Some(d),
            Self::Continue | Self::RotateCredential => None,
        }
    }

    /// Whether this action asks for a credential rotation.
    #[must_use]
    pub const fn rotates(self) -> bool {
        matches!(self, Self::RotateCredential | Self::PauseAndRotate(_))
    }
}

/// Safety margins applied before comparing counters to their ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Added to `rate_current`.
    pub rate_margin: u64,
    /// Added to `total_current`.
    pub total_margin: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            rate_margin: DEFAULT_RATE_MARGIN,
            total_margin: DEFAULT_TOTAL_MARGIN,
        }
    }
}

/// Stateless decision policy over a single [`QuotaSnapshot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RateGovernor {
    config: GovernorConfig,
}

impl RateGovernor {
    /// Creates a governor with the given margins.
    #[must_use]
    pub const fn new(config: GovernorConfig) -> Self {
        Self { config }
    }

    /// Decides the action for `snapshot` using the wall clock.
    #[must_use]
    pub fn observe(&self, snapshot: &QuotaSnapshot) -> Action {
        self.observe_at(snapshot, Utc::now())
    }

    /// Decides the action for `snapshot` as of `now`.
    #[must_use]
    pub fn observe_at(&self, snapshot: &QuotaSnapshot, now: DateTime<Utc>) -> Action {
        let rate = snapshot.rate_current.saturating_add(self.config.rate_margin);
        let total = snapshot
            .total_current
            .saturating_add(self.config.total_margin);

        let pause = rate >= snapshot.rate_max;
        let rotate = total >= snapshot.total_max;

        match (pause, rotate) {
            (false, false) => Action::Continue,
            (true, false) => Action::Pause(until_next_minute(now)),
            (false, true) => Action::RotateCredential,
            (true, true) => Action::PauseAndRotate(until_next_minute(now)),
        }
    }
}

/// Time remaining from `now` until the next whole-minute boundary.
///
/// Always in `(0, 60s]`; exactly on a boundary waits a full minute.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let millis = now.timestamp_millis();
    let next = (millis.div_euclid(MINUTE_MS) + 1) * MINUTE_MS;
    Duration::from_millis((next - millis) as u64)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn snapshot(rate_current: u64, rate_max: u64, total_current: u64, total_max: u64) -> QuotaSnapshot {
        QuotaSnapshot {
            rate_current,
            rate_max,
            total_current,
            total_max,
        }
    }

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
            + chrono::Duration::milliseconds(i64::from(ms))
    }

    #[test]
    fn continues_with_headroom() {
        let governor = RateGovernor::default();
        let action = governor.observe_at(&snapshot(10, 100, 10, 36_000), at(12, 0, 0, 0));
        assert_eq!(action, Action::Continue);
    }

    #[test]
    fn rate_margin_triggers_pause_before_ceiling() {
        let governor = RateGovernor::default();
        // 98 + 2 == 100
        let action = governor.observe_at(&snapshot(98, 100, 0, 36_000), at(12, 0, 15, 250));
        assert_eq!(action, Action::Pause(Duration::from_millis(44_750)));

        let action = governor.observe_at(&snapshot(97, 100, 0, 36_000), at(12, 0, 15, 250));
        assert_eq!(action, Action::Continue);
    }

    #[test]
    fn pause_equals_millis_to_next_minute() {
        let governor = RateGovernor::default();
        for (s, ms) in [(0, 1), (1, 0), (30, 500), (59, 999)] {
            let now = at(8, 41, s, ms);
            let action = governor.observe_at(&snapshot(100, 100, 0, 36_000), now);
            let expected = 60_000 - u64::from(s) * 1000 - u64::from(ms);
            assert_eq!(action.pause(), Some(Duration::from_millis(expected)));
        }
    }

    #[test]
    fn exact_boundary_waits_full_minute() {
        assert_eq!(until_next_minute(at(0, 0, 0, 0)), Duration::from_secs(60));
    }

    #[test]
    fn total_margin_triggers_rotation() {
        let governor = RateGovernor::default();
        // 999 + 5 = 1004 >= 1000
        let action = governor.observe_at(&snapshot(1, 100, 999, 1000), at(12, 0, 0, 0));
        assert_eq!(action, Action::RotateCredential);

        let action = governor.observe_at(&snapshot(1, 100, 994, 1000), at(12, 0, 0, 0));
        assert_eq!(action, Action::Continue);
    }

    #[test]
    fn pause_and_rotate_fire_together() {
        let governor = RateGovernor::default();
        let action = governor.observe_at(&snapshot(100, 100, 1000, 1000), at(12, 0, 50, 0));
        assert_eq!(action, Action::PauseAndRotate(Duration::from_secs(10)));
        assert!(action.rotates());
    }

    #[test]
    fn custom_margins_are_respected() {
        let governor = RateGovernor::new(GovernorConfig {
            rate_margin: 0,
            total_margin: 0,
        });
        let action = governor.observe_at(&snapshot(99, 100, 999, 1000), at(12, 0, 0, 0));
        assert_eq!(action, Action::Continue);
    }
}
