//! Conflict-aware merge of partial JSON updates
//!
//! Two writers racing on the same blob must neither silently lose a field
//! nor corrupt it. The merge compares three views of each top-level key:
//! the value the caller observed (`base`), the value persisted now
//! (`current`), and the caller's proposed value. A key another writer
//! changed concurrently resolves last-writer-wins, with a typed
//! [`ConflictMarker`] preserving the overwritten value for reconciliation
//! instead of an implicit dictionary overwrite.
//!
//! Fields with accumulate semantics (the reserved `__counters__` namespace,
//! plus any keys the per-entity-type [`MergePolicy`] opts in) merge by
//! numeric addition: the delta's value is an increment applied to the
//! current stored value, so concurrent increments accumulate instead of
//! overwriting each other.

use ratchet_core::{ConflictMarker, ConflictResolution, JsonDelta, JsonMap};
use serde_json::{Number, Value};
use std::collections::BTreeSet;

/// Reserved top-level key whose nested entries always accumulate
pub const COUNTERS_KEY: &str = "__counters__";

/// Write semantics for one top-level key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSemantics {
    /// Proposed value replaces the stored value (last-writer-wins on conflict)
    Replace,
    /// Proposed value is a numeric increment added to the stored value
    Accumulate,
}

/// Per-entity-type choice of replace vs accumulate fields
///
/// The caller registers which top-level keys carry counter semantics;
/// everything else replaces. `__counters__` accumulates regardless of
/// registration.
#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    accumulate_keys: BTreeSet<String>,
}

impl MergePolicy {
    /// Policy with no accumulate keys beyond `__counters__`
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a top-level key as accumulate-semantics
    pub fn with_accumulate(mut self, key: impl Into<String>) -> Self {
        self.accumulate_keys.insert(key.into());
        self
    }

    /// Semantics for a top-level key
    pub fn semantics_for(&self, key: &str) -> FieldSemantics {
        if key == COUNTERS_KEY || self.accumulate_keys.contains(key) {
            FieldSemantics::Accumulate
        } else {
            FieldSemantics::Replace
        }
    }
}

/// A fully merged blob plus the conflicts resolved while producing it
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// Blob ready to persist
    pub merged: JsonMap,
    /// Keys another writer changed concurrently (possibly empty)
    pub conflicts: Vec<ConflictMarker>,
}

impl MergeResult {
    /// True if any key needed conflict resolution
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge a proposed delta against the latest persisted blob
///
/// `base` is the blob as the caller observed it when forming the delta;
/// `current` is the blob persisted now. For each key in the delta:
///
/// - unchanged since base: apply the proposed value, no conflict
/// - changed concurrently, proposal equals the current value: idempotent
///   convergent write, nothing recorded
/// - changed concurrently to something else: last-writer-wins, marker
///   preserves the overwritten value
/// - accumulate-semantics keys: add the increment to the current value
///   (nested per counter name under `__counters__`), marker records the
///   concurrent movement when there was one
pub fn merge(
    base: &JsonMap,
    current: &JsonMap,
    delta: &JsonDelta,
    policy: &MergePolicy,
) -> MergeResult {
    let mut merged = current.clone();
    let mut conflicts = Vec::new();

    for (key, proposed) in &delta.changes {
        let base_val = base.get(key);
        let current_val = current.get(key);

        match policy.semantics_for(key) {
            FieldSemantics::Accumulate => {
                if let Some(summed) = accumulate(current_val, proposed) {
                    if current_val != base_val {
                        conflicts.push(ConflictMarker {
                            key: key.clone(),
                            overwritten: current_val.cloned().unwrap_or(Value::Null),
                            applied: proposed.clone(),
                            resolution: ConflictResolution::Accumulated,
                        });
                    }
                    merged.insert(key.clone(), summed);
                } else {
                    // Not numerically mergeable; fall back to replace rules
                    apply_replace(
                        &mut merged,
                        &mut conflicts,
                        key,
                        base_val,
                        current_val,
                        proposed,
                    );
                }
            }
            FieldSemantics::Replace => {
                apply_replace(
                    &mut merged,
                    &mut conflicts,
                    key,
                    base_val,
                    current_val,
                    proposed,
                );
            }
        }
    }

    MergeResult { merged, conflicts }
}

/// Replace-semantics application of one key
fn apply_replace(
    merged: &mut JsonMap,
    conflicts: &mut Vec<ConflictMarker>,
    key: &str,
    base_val: Option<&Value>,
    current_val: Option<&Value>,
    proposed: &Value,
) {
    if current_val == base_val {
        merged.insert(key.to_string(), proposed.clone());
    } else if current_val == Some(proposed) {
        // Idempotent convergent write: both writers agree
    } else {
        conflicts.push(ConflictMarker {
            key: key.to_string(),
            overwritten: current_val.cloned().unwrap_or(Value::Null),
            applied: proposed.clone(),
            resolution: ConflictResolution::LastWriterWins,
        });
        merged.insert(key.to_string(), proposed.clone());
    }
}

/// Accumulate `proposed` onto `current`, if the shapes allow it
///
/// Numbers add directly. Objects of numbers (the `__counters__` shape) add
/// entry-wise, keeping current entries the delta does not touch. Returns
/// None when the values are not numerically mergeable.
fn accumulate(current: Option<&Value>, proposed: &Value) -> Option<Value> {
    match (current, proposed) {
        (None, Value::Number(_)) => Some(proposed.clone()),
        (Some(Value::Number(a)), Value::Number(b)) => Some(Value::Number(add_numbers(a, b))),
        (None, Value::Object(_)) => Some(proposed.clone()),
        (Some(Value::Object(existing)), Value::Object(increments)) => {
            let mut counters = existing.clone();
            for (name, inc) in increments {
                let summed = match (counters.get(name), inc) {
                    (Some(Value::Number(a)), Value::Number(b)) => {
                        Value::Number(add_numbers(a, b))
                    }
                    // Fresh or non-numeric entry: the increment stands alone
                    _ => inc.clone(),
                };
                counters.insert(name.clone(), summed);
            }
            Some(Value::Object(counters))
        }
        _ => None,
    }
}

/// Add two JSON numbers, preferring integer arithmetic
fn add_numbers(a: &Number, b: &Number) -> Number {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Number::from(sum);
        }
    }
    let mut sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    if !sum.is_finite() {
        sum = if sum > 0.0 { f64::MAX } else { f64::MIN };
    }
    // Finite after the clamp, so from_f64 cannot fail
    Number::from_f64(sum).unwrap_or_else(|| Number::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blob(v: serde_json::Value) -> JsonMap {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_unchanged_key_applies_without_conflict() {
        let base = blob(json!({"status": "OPEN"}));
        let current = base.clone();
        let delta = JsonDelta::new().set("status", json!("CLOSED"));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["status"], json!("CLOSED"));
        assert!(!result.has_conflicts());
    }

    #[test]
    fn test_untouched_keys_survive_the_merge() {
        let base = blob(json!({"status": "OPEN", "owner": "a.reyes"}));
        let current = blob(json!({"status": "OPEN", "owner": "a.reyes"}));
        let delta = JsonDelta::new().set("status", json!("CLOSED"));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["owner"], json!("a.reyes"));
    }

    #[test]
    fn test_concurrent_divergent_write_records_one_marker() {
        // Another writer moved "notes" from {} to {"a":"x"}; we propose {"a":"y"}
        let base = blob(json!({"status": "OPEN", "notes": {}}));
        let current = blob(json!({"status": "OPEN", "notes": {"a": "x"}}));
        let delta = JsonDelta::new().set("notes", json!({"a": "y"}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["notes"], json!({"a": "y"}));
        assert_eq!(result.conflicts.len(), 1);

        let marker = &result.conflicts[0];
        assert_eq!(marker.key, "notes");
        assert_eq!(marker.overwritten, json!({"a": "x"}));
        assert_eq!(marker.applied, json!({"a": "y"}));
        assert_eq!(marker.resolution, ConflictResolution::LastWriterWins);
    }

    #[test]
    fn test_idempotent_convergent_write_records_nothing() {
        let base = blob(json!({"severity": "low"}));
        let current = blob(json!({"severity": "high"}));
        let delta = JsonDelta::new().set("severity", json!("high"));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["severity"], json!("high"));
        assert!(!result.has_conflicts());
    }

    #[test]
    fn test_concurrent_key_addition_conflicts() {
        // Key absent at base, another writer added it, we propose a different value
        let base = blob(json!({}));
        let current = blob(json!({"assignee": "b.okafor"}));
        let delta = JsonDelta::new().set("assignee", json!("c.lindt"));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["assignee"], json!("c.lindt"));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].overwritten, json!("b.okafor"));
    }

    #[test]
    fn test_counters_accumulate_instead_of_overwriting() {
        // Both writers read retries=0 and want +1. The first landed already;
        // our increment must stack on top of it, not replace it.
        let base = blob(json!({"__counters__": {"retries": 0}}));
        let current = blob(json!({"__counters__": {"retries": 1}}));
        let delta = JsonDelta::new().set("__counters__", json!({"retries": 1}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["__counters__"], json!({"retries": 2}));
    }

    #[test]
    fn test_counter_accumulation_records_accumulated_marker() {
        let base = blob(json!({"__counters__": {"retries": 0}}));
        let current = blob(json!({"__counters__": {"retries": 1}}));
        let delta = JsonDelta::new().set("__counters__", json!({"retries": 1}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(
            result.conflicts[0].resolution,
            ConflictResolution::Accumulated
        );
    }

    #[test]
    fn test_counters_untouched_names_survive() {
        let base = blob(json!({"__counters__": {"retries": 2, "escalations": 1}}));
        let current = base.clone();
        let delta = JsonDelta::new().set("__counters__", json!({"retries": 1}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(
            result.merged["__counters__"],
            json!({"retries": 3, "escalations": 1})
        );
        assert!(!result.has_conflicts());
    }

    #[test]
    fn test_counter_from_absent_starts_at_increment() {
        let base = blob(json!({}));
        let current = blob(json!({}));
        let delta = JsonDelta::new().set("__counters__", json!({"retries": 1}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        assert_eq!(result.merged["__counters__"], json!({"retries": 1}));
    }

    #[test]
    fn test_policy_accumulate_key_adds_plain_numbers() {
        let policy = MergePolicy::new().with_accumulate("escalation_level");
        let base = blob(json!({"escalation_level": 1}));
        let current = blob(json!({"escalation_level": 2}));
        let delta = JsonDelta::new().set("escalation_level", json!(1));

        let result = merge(&base, &current, &delta, &policy);
        assert_eq!(result.merged["escalation_level"], json!(3));
    }

    #[test]
    fn test_accumulate_key_with_non_numeric_value_falls_back_to_replace() {
        let policy = MergePolicy::new().with_accumulate("tags");
        let base = blob(json!({"tags": "a"}));
        let current = blob(json!({"tags": "b"}));
        let delta = JsonDelta::new().set("tags", json!("c"));

        let result = merge(&base, &current, &delta, &policy);
        assert_eq!(result.merged["tags"], json!("c"));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(
            result.conflicts[0].resolution,
            ConflictResolution::LastWriterWins
        );
    }

    #[test]
    fn test_float_counters_add() {
        let base = blob(json!({"__counters__": {"cpu_seconds": 0.5}}));
        let current = base.clone();
        let delta = JsonDelta::new().set("__counters__", json!({"cpu_seconds": 0.25}));

        let result = merge(&base, &current, &delta, &MergePolicy::new());
        let total = result.merged["__counters__"]["cpu_seconds"].as_f64().unwrap();
        assert!((total - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_integer_overflow_widens_to_float() {
        let a = Number::from(i64::MAX);
        let b = Number::from(1);
        let sum = add_numbers(&a, &b);
        assert!(sum.as_f64().unwrap() > i64::MAX as f64 - 2.0);
    }

    #[test]
    fn test_semantics_for_reserved_key() {
        let policy = MergePolicy::new();
        assert_eq!(
            policy.semantics_for(COUNTERS_KEY),
            FieldSemantics::Accumulate
        );
        assert_eq!(policy.semantics_for("status"), FieldSemantics::Replace);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn small_int() -> impl Strategy<Value = i64> {
            -1000i64..1000
        }

        proptest! {
            /// With no concurrent movement (current == base), a merge never
            /// reports conflicts, whatever the delta proposes.
            #[test]
            fn no_movement_means_no_conflicts(v in small_int(), w in small_int()) {
                let base = blob(json!({"a": v}));
                let current = base.clone();
                let delta = JsonDelta::new().set("a", json!(w));
                let result = merge(&base, &current, &delta, &MergePolicy::new());
                prop_assert!(!result.has_conflicts());
                prop_assert_eq!(&result.merged["a"], &json!(w));
            }

            /// Concurrent counter increments accumulate to the exact sum in
            /// either landing order.
            #[test]
            fn counter_increments_commute(start in small_int(), a in small_int(), b in small_int()) {
                let policy = MergePolicy::new();
                let base = blob(json!({"__counters__": {"n": start}}));

                // a lands first, b merges against it
                let after_a = blob(json!({"__counters__": {"n": start + a}}));
                let delta_b = JsonDelta::new().set("__counters__", json!({"n": b}));
                let ab = merge(&base, &after_a, &delta_b, &policy);

                // b lands first, a merges against it
                let after_b = blob(json!({"__counters__": {"n": start + b}}));
                let delta_a = JsonDelta::new().set("__counters__", json!({"n": a}));
                let ba = merge(&base, &after_b, &delta_a, &policy);

                let expected = json!({"n": start + a + b});
                prop_assert_eq!(&ab.merged["__counters__"], &expected);
                prop_assert_eq!(&ba.merged["__counters__"], &expected);
            }

            /// Replace semantics always lands the delta's value, conflict
            /// or not.
            #[test]
            fn replace_delta_always_wins(v in small_int(), w in small_int(), p in small_int()) {
                let base = blob(json!({"a": v}));
                let current = blob(json!({"a": w}));
                let delta = JsonDelta::new().set("a", json!(p));
                let result = merge(&base, &current, &delta, &MergePolicy::new());
                prop_assert_eq!(&result.merged["a"], &json!(p));
            }
        }
    }
}
