//! Alert cooldown gating.
//!
//! A `CooldownTracker` decides whether an alert for a given identity key may
//! fire now, and records the alert time in the same call when it may.
//! Suppressed alerts are dropped, never queued.

use crate::types::{FaceRegion, IdentityResult};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Key under which an alert's last-fire time is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// One shared key for the whole session.
    Session,
    /// Nearest numeric label reported by the recognizer.
    Label(i32),
    /// Ordinal of the face within its frame.
    FaceIndex(usize),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Label(label) => write!(f, "label {label}"),
            Self::FaceIndex(index) => write!(f, "face {index}"),
        }
    }
}

/// Which identity key scheme a run uses. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownPolicy {
    /// One alert per window no matter how many unknown faces appear.
    #[default]
    Global,
    /// One window per nearest recognizer label.
    Label,
    /// One window per in-frame face ordinal. The ordinal is not a stable
    /// identity: the same person can get a different index every frame.
    FaceIndex,
}

impl CooldownPolicy {
    pub fn key_for(&self, region: &FaceRegion, result: &IdentityResult) -> IdentityKey {
        match self {
            Self::Global => IdentityKey::Session,
            Self::Label => IdentityKey::Label(result.label),
            Self::FaceIndex => IdentityKey::FaceIndex(region.index),
        }
    }
}

impl FromStr for CooldownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "session" => Ok(Self::Global),
            "label" => Ok(Self::Label),
            "face-index" | "face_index" => Ok(Self::FaceIndex),
            other => Err(format!("unknown cooldown policy {other:?} (expected global, label, or face-index)")),
        }
    }
}

/// Per-key last-alert times with a fixed minimum spacing.
#[derive(Debug)]
pub struct CooldownTracker {
    cooldown: Duration,
    last_alert: HashMap<IdentityKey, Instant>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    /// Gate an alert for `key` at time `now`.
    ///
    /// Returns true and records `now` if the key has no record or its last
    /// alert is at least `cooldown` old. A `now` earlier than the stored time
    /// counts as inside the window and leaves the record unchanged.
    pub fn should_alert(&mut self, key: &IdentityKey, now: Instant) -> bool {
        if let Some(&last) = self.last_alert.get(key) {
            if now < last || now.duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_alert.insert(key.clone(), now);
        true
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_first_alert_fires() {
        let mut t = CooldownTracker::default();
        assert!(t.should_alert(&IdentityKey::Session, Instant::now()));
    }

    #[test]
    fn test_second_alert_within_window_suppressed() {
        let mut t = CooldownTracker::new(secs(30));
        let t0 = Instant::now();
        assert!(t.should_alert(&IdentityKey::Session, t0));
        assert!(!t.should_alert(&IdentityKey::Session, t0));
        assert!(!t.should_alert(&IdentityKey::Session, t0 + secs(5)));
        assert!(!t.should_alert(&IdentityKey::Session, t0 + secs(29)));
    }

    #[test]
    fn test_rearms_exactly_at_cooldown() {
        let mut t = CooldownTracker::new(secs(30));
        let t0 = Instant::now();
        assert!(t.should_alert(&IdentityKey::Session, t0));
        assert!(t.should_alert(&IdentityKey::Session, t0 + secs(30)));
        // The record moved forward, so the next window starts at t0+30.
        assert!(!t.should_alert(&IdentityKey::Session, t0 + secs(45)));
        assert!(t.should_alert(&IdentityKey::Session, t0 + secs(60)));
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut t = CooldownTracker::new(secs(30));
        let t0 = Instant::now();
        assert!(t.should_alert(&IdentityKey::Session, t0));
        assert!(!t.should_alert(&IdentityKey::Session, t0 + secs(20)));
        // Still measured from t0, not from the suppressed attempt.
        assert!(t.should_alert(&IdentityKey::Session, t0 + secs(30)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut t = CooldownTracker::new(secs(30));
        let t0 = Instant::now();
        assert!(t.should_alert(&IdentityKey::Label(1), t0));
        assert!(t.should_alert(&IdentityKey::Label(2), t0));
        assert!(!t.should_alert(&IdentityKey::Label(1), t0 + secs(1)));
    }

    #[test]
    fn test_earlier_time_never_rewinds() {
        let mut t = CooldownTracker::new(secs(30));
        let t0 = Instant::now() + secs(100);
        assert!(t.should_alert(&IdentityKey::Session, t0));
        assert!(!t.should_alert(&IdentityKey::Session, t0 - secs(60)));
        // The record stayed at t0: t0+29 is still inside, t0+30 is not.
        assert!(!t.should_alert(&IdentityKey::Session, t0 + secs(29)));
        assert!(t.should_alert(&IdentityKey::Session, t0 + secs(30)));
    }

    #[test]
    fn test_policy_keys() {
        let region = FaceRegion { x: 0, y: 0, width: 10, height: 10, index: 3 };
        let result = IdentityResult { identity: Identity::Unknown, label: 7, confidence: 80.0 };
        assert_eq!(CooldownPolicy::Global.key_for(&region, &result), IdentityKey::Session);
        assert_eq!(CooldownPolicy::Label.key_for(&region, &result), IdentityKey::Label(7));
        assert_eq!(CooldownPolicy::FaceIndex.key_for(&region, &result), IdentityKey::FaceIndex(3));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("global".parse::<CooldownPolicy>(), Ok(CooldownPolicy::Global));
        assert_eq!("Label".parse::<CooldownPolicy>(), Ok(CooldownPolicy::Label));
        assert_eq!("face-index".parse::<CooldownPolicy>(), Ok(CooldownPolicy::FaceIndex));
        assert!("sometimes".parse::<CooldownPolicy>().is_err());
    }
}
