//! Duration gate: pending-condition tracking keyed by an arbitrary id.
//!
//! The alerting engine keys entries by series fingerprint; the scaling
//! engine keys them by rule id. Contract per observation:
//!
//! - condition holds, key absent: record `first_seen = now`, not yet.
//! - condition holds, `now - first_seen >= duration`: fire and clear.
//! - condition does not hold: clear the entry if present.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

// ---------------------------------------------------------------------------
// GateDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Condition does not hold and nothing was pending.
    Idle,
    /// Condition does not hold; a pending entry was removed.
    Cleared,
    /// Condition holds but has not held for the required duration yet.
    NotYet { since: DateTime<Utc> },
    /// Condition has held continuously for at least the required duration.
    /// The pending entry is cleared as part of this decision.
    Fire { held_for: Duration },
}

impl GateDecision {
    pub fn is_fire(self) -> bool {
        matches!(self, GateDecision::Fire { .. })
    }
}

// ---------------------------------------------------------------------------
// PendingGate
// ---------------------------------------------------------------------------

/// First-seen timestamps for currently-pending conditions.
///
/// Owned by a manager and guarded by that manager's mutex; this type itself
/// is plain data with no interior locking.
#[derive(Debug, Clone, Default)]
pub struct PendingGate<K: Ord> {
    pending: BTreeMap<K, DateTime<Utc>>,
}

impl<K: Ord + Clone> PendingGate<K> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Apply one evaluation outcome for `key`.
    pub fn observe(
        &mut self,
        key: K,
        holds: bool,
        duration_seconds: i64,
        now: DateTime<Utc>,
    ) -> GateDecision {
        if !holds {
            return if self.pending.remove(&key).is_some() {
                GateDecision::Cleared
            } else {
                GateDecision::Idle
            };
        }

        let first_seen = *self.pending.entry(key.clone()).or_insert(now);
        let held_for = now - first_seen;
        if held_for >= Duration::seconds(duration_seconds.max(0)) {
            self.pending.remove(&key);
            GateDecision::Fire { held_for }
        } else {
            GateDecision::NotYet { since: first_seen }
        }
    }

    /// Pending entries as plain data, for persistence or inspection.
    pub fn snapshot(&self) -> BTreeMap<K, DateTime<Utc>> {
        self.pending.clone()
    }

    /// Replace the pending map wholesale (state restore on start).
    pub fn restore(&mut self, entries: BTreeMap<K, DateTime<Utc>>) {
        self.pending = entries;
    }

    /// Insert one restored entry, keeping an existing first-seen if present.
    pub fn seed(&mut self, key: K, first_seen: DateTime<Utc>) {
        self.pending.entry(key).or_insert(first_seen);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn zero_duration_fires_on_first_breach() {
        let mut gate: PendingGate<&str> = PendingGate::new();
        assert!(gate.observe("fp", true, 0, t(0)).is_fire());
        assert!(gate.is_empty(), "fire clears the entry");
    }

    #[test]
    fn fires_only_after_continuous_hold() {
        let mut gate: PendingGate<&str> = PendingGate::new();

        assert_eq!(
            gate.observe("fp", true, 60, t(0)),
            GateDecision::NotYet { since: t(0) }
        );
        assert_eq!(
            gate.observe("fp", true, 60, t(30)),
            GateDecision::NotYet { since: t(0) }
        );
        match gate.observe("fp", true, 60, t(60)) {
            GateDecision::Fire { held_for } => assert_eq!(held_for, Duration::seconds(60)),
            other => panic!("expected Fire, got {other:?}"),
        }
    }

    #[test]
    fn break_in_condition_resets_the_clock() {
        let mut gate: PendingGate<&str> = PendingGate::new();

        gate.observe("fp", true, 60, t(0));
        assert_eq!(gate.observe("fp", false, 60, t(30)), GateDecision::Cleared);

        // Condition returns: the hold restarts from the new first-seen.
        assert_eq!(
            gate.observe("fp", true, 60, t(40)),
            GateDecision::NotYet { since: t(40) }
        );
        assert_eq!(
            gate.observe("fp", true, 60, t(90)),
            GateDecision::NotYet { since: t(40) }
        );
        assert!(gate.observe("fp", true, 60, t(100)).is_fire());
    }

    #[test]
    fn idle_when_nothing_pending() {
        let mut gate: PendingGate<&str> = PendingGate::new();
        assert_eq!(gate.observe("fp", false, 60, t(0)), GateDecision::Idle);
    }

    #[test]
    fn keys_are_independent() {
        let mut gate: PendingGate<&str> = PendingGate::new();
        gate.observe("a", true, 60, t(0));
        gate.observe("b", true, 60, t(50));

        assert!(gate.observe("a", true, 60, t(60)).is_fire());
        assert_eq!(
            gate.observe("b", true, 60, t(60)),
            GateDecision::NotYet { since: t(50) }
        );
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let mut gate: PendingGate<String> = PendingGate::new();
        gate.observe("a".to_string(), true, 600, t(0));
        gate.observe("b".to_string(), true, 600, t(10));

        let snap = gate.snapshot();
        let mut restored: PendingGate<String> = PendingGate::new();
        restored.restore(snap);

        // Restored clock continues from the original first-seen.
        assert!(restored
            .observe("a".to_string(), true, 600, t(600))
            .is_fire());
    }
}
