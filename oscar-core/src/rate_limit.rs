//! Per-session rate limiter.
//!
//! Five independent classes, each an exponential moving average of
//! inter-event gaps in milliseconds, gating SNAC admission through a
//! clear/alert/limited/disconnect state machine. Reconfiguration keeps
//! two snapshots per class: the reseeded baseline and the last
//! observed status, so a notification pass running between two
//! reconfigurations doesn't lose the states clients were last told
//! about.

use std::time::Instant;

use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RateClassId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateStatus {
    Clear,
    Alert,
    Limited,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateClassConfig {
    pub id: RateClassId,
    pub window_size: i32,
    pub clear_level: i32,
    pub alert_level: i32,
    pub limit_level: i32,
    pub disconnect_level: i32,
    pub max_level: i32,
}

/// Default class thresholds: id, window, clear, alert,
/// limit, disconnect, max.
pub const DEFAULT_CLASSES: [RateClassConfig; 5] = [
    RateClassConfig {
        id: RateClassId(1),
        window_size: 80,
        clear_level: 2500,
        alert_level: 2000,
        limit_level: 1500,
        disconnect_level: 800,
        max_level: 6000,
    },
    RateClassConfig {
        id: RateClassId(2),
        window_size: 80,
        clear_level: 3000,
        alert_level: 2000,
        limit_level: 1500,
        disconnect_level: 1000,
        max_level: 6000,
    },
    RateClassConfig {
        id: RateClassId(3),
        window_size: 20,
        clear_level: 5100,
        alert_level: 5000,
        limit_level: 4000,
        disconnect_level: 3000,
        max_level: 6000,
    },
    RateClassConfig {
        id: RateClassId(4),
        window_size: 20,
        clear_level: 5500,
        alert_level: 5300,
        limit_level: 4200,
        disconnect_level: 3000,
        max_level: 8000,
    },
    RateClassConfig {
        id: RateClassId(5),
        window_size: 10,
        clear_level: 5500,
        alert_level: 5300,
        limit_level: 4200,
        disconnect_level: 3000,
        max_level: 8000,
    },
];

#[derive(Debug, Clone)]
pub struct RateClassState {
    pub config: RateClassConfig,
    pub current_level: i32,
    pub last_time: Instant,
    pub current_status: RateStatus,
    pub subscribed: bool,
    pub limited_now: bool,
}

impl RateClassState {
    fn new(config: RateClassConfig, now: Instant) -> RateClassState {
        RateClassState {
            current_level: config.max_level,
            last_time: now,
            current_status: RateStatus::Clear,
            subscribed: false,
            limited_now: false,
            config,
        }
    }
}

/// The outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub status: RateStatus,
    /// `Some(previous)` when `current_status` changed this call, for
    /// subscription notification fan-out.
    pub status_changed_from: Option<RateStatus>,
}

/// Static `(foodGroup, subGroup) -> class` lookup table. Unmapped pairs
/// bypass rate control entirely.
#[derive(Default)]
pub struct RateClassTable {
    map: AHashMap<(u16, u16), RateClassId>,
}

impl RateClassTable {
    pub fn new() -> RateClassTable {
        RateClassTable::default()
    }

    pub fn insert(&mut self, food_group: u16, sub_group: u16, class: RateClassId) {
        self.map.insert((food_group, sub_group), class);
    }

    pub fn lookup(&self, food_group: u16, sub_group: u16) -> Option<RateClassId> {
        self.map.get(&(food_group, sub_group)).copied()
    }
}

/// Per-session limiter holding all five class states.
pub struct RateLimiter {
    classes: AHashMap<RateClassId, RateClassState>,
    /// Snapshot taken at the last `set_rate_classes` call, used as the
    /// reconfiguration baseline.
    original: AHashMap<RateClassId, RateClassState>,
    /// Snapshot of the state as last observed by a diff-based client
    /// notification pass.
    last_observed: AHashMap<RateClassId, RateStatus>,
}

impl RateLimiter {
    pub fn new(configs: &[RateClassConfig], now: Instant) -> RateLimiter {
        let classes: AHashMap<_, _> = configs
            .iter()
            .map(|c| (c.id, RateClassState::new(*c, now)))
            .collect();
        let original = classes.clone();
        let last_observed = classes
            .iter()
            .map(|(id, s)| (*id, s.current_status))
            .collect();
        RateLimiter {
            classes,
            original,
            last_observed,
        }
    }

    pub fn state(&self, class: RateClassId) -> Option<&RateClassState> {
        self.classes.get(&class)
    }

    pub fn set_subscribed(&mut self, class: RateClassId, subscribed: bool) {
        if let Some(state) = self.classes.get_mut(&class) {
            state.subscribed = subscribed;
        }
    }

    /// Runs the step-by-step admission check for one class at `now`.
    pub fn admit(&mut self, class: RateClassId, now: Instant) -> Option<Admission> {
        let state = self.classes.get_mut(&class)?;
        let gap_ms = now
            .saturating_duration_since(state.last_time)
            .as_millis()
            .min(i32::MAX as u128) as i32;
        let window = state.config.window_size.max(1);
        let new_avg = ((state.current_level as i64 * (window as i64 - 1)) + gap_ms as i64)
            / window as i64;
        let new_avg = (new_avg as i32).clamp(0, state.config.max_level);

        let previous_status = state.current_status;
        if state.limited_now && new_avg >= state.config.clear_level {
            state.limited_now = false;
            state.current_status = RateStatus::Clear;
        } else if new_avg < state.config.disconnect_level {
            state.current_status = RateStatus::Disconnect;
        } else if new_avg < state.config.limit_level {
            state.limited_now = true;
            state.current_status = RateStatus::Limited;
        } else if new_avg < state.config.alert_level {
            state.current_status = RateStatus::Alert;
        } else {
            state.current_status = RateStatus::Clear;
        }

        state.current_level = new_avg;
        state.last_time = now;

        let allowed = !state.limited_now && state.current_status != RateStatus::Disconnect;
        let status_changed_from = if state.current_status != previous_status {
            Some(previous_status)
        } else {
            None
        };
        if let Some(observed) = self.last_observed.get_mut(&class) {
            if status_changed_from.is_some() {
                *observed = state.current_status;
            }
        }
        Some(Admission {
            allowed,
            status: state.current_status,
            status_changed_from,
        })
    }

    /// `SetRateClasses`: reseeds every class to fully clear,
    /// preserves `subscribed` bits, and stashes the previous observed
    /// states so a diff-based notification can be sent to clients.
    pub fn set_rate_classes(&mut self, configs: &[RateClassConfig], now: Instant) {
        let mut new_classes = AHashMap::default();
        for config in configs {
            let subscribed = self
                .classes
                .get(&config.id)
                .map(|s| s.subscribed)
                .unwrap_or(false);
            let mut state = RateClassState::new(*config, now);
            state.current_level = config.max_level;
            state.subscribed = subscribed;
            new_classes.insert(config.id, state);
        }
        self.last_observed = self
            .classes
            .iter()
            .map(|(id, s)| (*id, s.current_status))
            .collect();
        self.original = new_classes.clone();
        self.classes = new_classes;
    }

    pub fn original_snapshot(&self) -> &AHashMap<RateClassId, RateClassState> {
        &self.original
    }

    pub fn last_observed(&self) -> &AHashMap<RateClassId, RateStatus> {
        &self.last_observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn class1() -> RateClassConfig {
        DEFAULT_CLASSES[0]
    }

    #[test]
    fn gap_sequence_drives_level_down_to_limited() {
        // class{clear=2500, alert=2000, limit=1500, disconnect=800,
        // max=6000, window=80}, starting at 6000, fed 80 gaps of 10ms,
        // should end below 1500 and status Limited.
        let mut limiter = RateLimiter::new(&[class1()], Instant::now());
        let mut now = Instant::now();
        let mut last = Admission {
            allowed: true,
            status: RateStatus::Clear,
            status_changed_from: None,
        };
        for _ in 0..80 {
            now += Duration::from_millis(10);
            last = limiter.admit(RateClassId(1), now).unwrap();
        }
        let state = limiter.state(RateClassId(1)).unwrap();
        assert!(state.current_level < 1500);
        assert_eq!(state.current_status, RateStatus::Limited);
        assert!(!last.allowed);

        // Further tight-gap events remain rejected until the class clears.
        now += Duration::from_millis(10);
        let admission = limiter.admit(RateClassId(1), now).unwrap();
        assert!(!admission.allowed);
        assert_eq!(admission.status, RateStatus::Limited);

        // A long enough gap pulls the average back above clear_level and
        // un-limits the class.
        now += Duration::from_millis(1_000_000);
        let admission = limiter.admit(RateClassId(1), now).unwrap();
        assert!(admission.allowed);
        assert_eq!(admission.status, RateStatus::Clear);
    }

    #[test]
    fn rejected_attempts_still_update_level_and_time() {
        let mut limiter = RateLimiter::new(&[class1()], Instant::now());
        let mut now = Instant::now();
        for _ in 0..200 {
            now += Duration::from_millis(1);
            limiter.admit(RateClassId(1), now);
        }
        let state = limiter.state(RateClassId(1)).unwrap();
        // Clamped at/after disconnect/limit thresholds but still tracking.
        assert_eq!(state.last_time, now);
    }

    #[test]
    fn level_is_monotonic_in_gap_for_a_fixed_starting_point() {
        let mut low_gap = RateLimiter::new(&[class1()], Instant::now());
        let mut high_gap = RateLimiter::new(&[class1()], Instant::now());
        let base = Instant::now();
        low_gap.admit(RateClassId(1), base + Duration::from_millis(10));
        high_gap.admit(RateClassId(1), base + Duration::from_millis(5000));
        let low = low_gap.state(RateClassId(1)).unwrap().current_level;
        let high = high_gap.state(RateClassId(1)).unwrap().current_level;
        assert!(high >= low);
    }

    #[test]
    fn set_rate_classes_reseeds_fully_clear_and_keeps_subscription() {
        let mut limiter = RateLimiter::new(&[class1()], Instant::now());
        limiter.set_subscribed(RateClassId(1), true);
        let now = Instant::now() + Duration::from_millis(10);
        limiter.admit(RateClassId(1), now);

        limiter.set_rate_classes(&[class1()], now);
        let state = limiter.state(RateClassId(1)).unwrap();
        assert_eq!(state.current_level, class1().max_level);
        assert_eq!(state.current_status, RateStatus::Clear);
        assert!(state.subscribed);
    }

    #[test]
    fn unmapped_food_group_bypasses_rate_control() {
        let table = RateClassTable::new();
        assert_eq!(table.lookup(0x9999, 0x0001), None);
    }

    #[test]
    fn status_change_is_reported_exactly_when_status_differs() {
        let mut limiter = RateLimiter::new(&[class1()], Instant::now());
        let mut now = Instant::now();
        let first = limiter.admit(RateClassId(1), now).unwrap();
        assert_eq!(first.status_changed_from, None); // starts clear, stays clear
        for _ in 0..80 {
            now += Duration::from_millis(1);
            limiter.admit(RateClassId(1), now);
        }
        // eventually a transition away from Clear must have produced a Some(_)
        now += Duration::from_millis(1);
        let admission = limiter.admit(RateClassId(1), now).unwrap();
        // by this point the class should already be Limited; re-confirm
        // that the state is internally consistent (no flapping surprise)
        assert_eq!(admission.status, limiter.state(RateClassId(1)).unwrap().current_status);
    }
}
