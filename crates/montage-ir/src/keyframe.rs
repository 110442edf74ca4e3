//! Keyframes and the parameter interpolation engine.
//!
//! Keyframe times are normalized to the owning entity's own duration, so a
//! keyframe at `0.5` always sits halfway through its clip or overlay no
//! matter where that entity lands on the composition clock.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use montage_core::{MontageError, MontageResult, Point2D};

/// Two keyframes of one entity may not be inserted closer than this.
pub const MIN_KEYFRAME_SPACING: f64 = 0.02;

/// Component-wise linear interpolation between two parameter vectors.
pub trait Interpolate: Clone {
    /// Value at `t` between `self` (t = 0) and `other` (t = 1).
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for Point2D {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Point2D::lerp(self, other, t)
    }
}

/// A parameter vector recorded at a normalized time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<V> {
    /// Position within the owning entity, in `[0, 1]`.
    pub time: f64,
    pub value: V,
}

impl<V> Keyframe<V> {
    pub fn new(time: f64, value: V) -> Self {
        Self {
            time: clamp_unit(time),
            value,
        }
    }
}

/// Evaluate a sorted keyframe list at normalized time `t`.
///
/// Holds the first value before the first keyframe and the last value after
/// the last one; blends the bracketing pair linearly in between. Returns
/// `None` for an empty list, in which case callers use their static values.
pub fn interpolate<V: Interpolate>(keys: &[Keyframe<V>], t: f64) -> Option<V> {
    let first = keys.first()?;
    let last = keys.last()?;
    let t = if t.is_nan() { 0.0 } else { t };

    if t <= first.time {
        return Some(first.value.clone());
    }
    if t >= last.time {
        return Some(last.value.clone());
    }

    // First keyframe strictly after t; both neighbours exist because
    // first.time < t < last.time.
    let upper = keys.partition_point(|k| k.time <= t);
    let a = &keys[upper - 1];
    let b = &keys[upper];
    let span = b.time - a.time;
    let seg_t = if span == 0.0 { 0.0 } else { (t - a.time) / span };
    Some(a.value.lerp(&b.value, seg_t))
}

/// An ascending list of keyframes owned by one clip or overlay.
///
/// Keyframes with equal times keep the order in which they arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeList<V> {
    keys: Vec<Keyframe<V>>,
}

impl<V> Default for KeyframeList<V> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<V> KeyframeList<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from keyframes in any order. Times are clamped to
    /// `[0, 1]`; no spacing rule is applied.
    pub fn from_keys(keys: Vec<Keyframe<V>>) -> Self {
        let mut keys: Vec<Keyframe<V>> = keys
            .into_iter()
            .map(|k| Keyframe::new(k.time, k.value))
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[Keyframe<V>] {
        &self.keys
    }

    pub fn get(&self, index: usize) -> Option<&Keyframe<V>> {
        self.keys.get(index)
    }

    /// Remove and return the keyframe at `index`.
    pub fn remove(&mut self, index: usize) -> MontageResult<Keyframe<V>> {
        if index >= self.keys.len() {
            return Err(MontageError::NotFound(format!("keyframe #{}", index)));
        }
        Ok(self.keys.remove(index))
    }

    /// Replace the value of the keyframe at `index`.
    pub fn set_value(&mut self, index: usize, value: V) -> MontageResult<()> {
        let key = self
            .keys
            .get_mut(index)
            .ok_or_else(|| MontageError::NotFound(format!("keyframe #{}", index)))?;
        key.value = value;
        Ok(())
    }

    /// Move the keyframe at `index` to `time` and re-sort. A keyframe moved
    /// onto the time of others is placed after them. Returns its new index.
    pub fn move_keyframe(&mut self, index: usize, time: f64) -> MontageResult<usize> {
        let mut key = self.remove(index)?;
        key.time = clamp_unit(time);
        Ok(self.insert_sorted(key))
    }

    fn insert_sorted(&mut self, key: Keyframe<V>) -> usize {
        let at = self.keys.partition_point(|k| k.time <= key.time);
        self.keys.insert(at, key);
        at
    }

    fn check_spacing(&self, time: f64) -> MontageResult<()> {
        if self
            .keys
            .iter()
            .any(|k| (k.time - time).abs() < MIN_KEYFRAME_SPACING)
        {
            return Err(MontageError::KeyframeTooClose {
                time,
                spacing: MIN_KEYFRAME_SPACING,
            });
        }
        Ok(())
    }
}

impl<V: Interpolate> KeyframeList<V> {
    /// Interpolated value at normalized time `t`, or `None` without keyframes.
    pub fn sample(&self, t: f64) -> Option<V> {
        interpolate(&self.keys, t)
    }

    /// Interpolated value at `t`, falling back to `base` without keyframes.
    pub fn sample_or(&self, t: f64, base: &V) -> V {
        self.sample(t).unwrap_or_else(|| base.clone())
    }

    /// Record a new keyframe at `time`, seeded with the value currently shown
    /// there (or `base` when the list is empty). Returns its index.
    pub fn insert_at(&mut self, time: f64, base: &V) -> MontageResult<usize> {
        let time = clamp_unit(time);
        self.check_spacing(time)?;
        let value = self.sample_or(time, base);
        Ok(self.insert_sorted(Keyframe { time, value }))
    }

    /// Insert a keyframe with an explicit value, subject to the same spacing
    /// rule as [`KeyframeList::insert_at`].
    pub fn insert(&mut self, key: Keyframe<V>) -> MontageResult<usize> {
        let key = Keyframe::new(key.time, key.value);
        self.check_spacing(key.time)?;
        Ok(self.insert_sorted(key))
    }

    /// Divide the animation at normalized time `at` into the part before and
    /// the part after, each renormalized to `[0, 1]`. Boundary keyframes
    /// carry the value at the cut so both halves animate exactly as before.
    pub fn split_at(&self, at: f64) -> (KeyframeList<V>, KeyframeList<V>) {
        let Some(cut_value) = self.sample(at) else {
            return (KeyframeList::new(), KeyframeList::new());
        };
        if at <= 0.0 || at >= 1.0 {
            return (self.clone(), self.clone());
        }

        let mut left: Vec<Keyframe<V>> = self
            .keys
            .iter()
            .filter(|k| k.time <= at)
            .map(|k| Keyframe::new(k.time / at, k.value.clone()))
            .collect();
        if left.last().map_or(true, |k| k.time < 1.0) {
            left.push(Keyframe::new(1.0, cut_value.clone()));
        }

        let mut right: Vec<Keyframe<V>> = Vec::with_capacity(self.keys.len() + 1);
        if self.keys.iter().all(|k| k.time != at) {
            right.push(Keyframe::new(0.0, cut_value));
        }
        right.extend(
            self.keys
                .iter()
                .filter(|k| k.time >= at)
                .map(|k| Keyframe::new((k.time - at) / (1.0 - at), k.value.clone())),
        );

        (KeyframeList { keys: left }, KeyframeList { keys: right })
    }
}

impl<V: Serialize> Serialize for KeyframeList<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for KeyframeList<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let keys = Vec::<Keyframe<V>>::deserialize(deserializer)?;
        Ok(KeyframeList::from_keys(keys))
    }
}

/// Map an entity-local offset onto `[0, 1]`. Entities without a positive
/// duration always sample at 0.
pub fn normalized(offset: f64, duration: f64) -> f64 {
    if duration <= 0.0 || !duration.is_finite() {
        return 0.0;
    }
    clamp_unit(offset / duration)
}

fn clamp_unit(t: f64) -> f64 {
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(points: &[(f64, f64)]) -> KeyframeList<f64> {
        KeyframeList::from_keys(points.iter().map(|&(t, v)| Keyframe::new(t, v)).collect())
    }

    #[test]
    fn test_empty_list_has_no_value() {
        let keys: KeyframeList<f64> = KeyframeList::new();
        assert!(keys.sample(0.5).is_none());
        assert_eq!(keys.sample_or(0.5, &7.0), 7.0);
    }

    #[test]
    fn test_hold_before_and_after() {
        let keys = list(&[(0.25, 10.0), (0.75, 20.0)]);
        assert_eq!(keys.sample(0.0), Some(10.0));
        assert_eq!(keys.sample(0.25), Some(10.0));
        assert_eq!(keys.sample(0.75), Some(20.0));
        assert_eq!(keys.sample(1.0), Some(20.0));
    }

    #[test]
    fn test_linear_between_bracketing_pair() {
        let keys = list(&[(0.0, 0.0), (0.5, 100.0), (1.0, 0.0)]);
        assert!((keys.sample(0.25).unwrap() - 50.0).abs() < 1e-9);
        assert!((keys.sample(0.75).unwrap() - 50.0).abs() < 1e-9);
        assert!((keys.sample(0.5).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_keyframes_midpoint() {
        let keys = list(&[(0.0, 1.0), (1.0, 2.0)]);
        assert!((keys.sample(0.5).unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_is_idempotent() {
        let keys = list(&[(0.1, 3.0), (0.4, -2.0), (0.9, 8.5)]);
        for i in 0..=100 {
            let t = i as f64 / 100.0;
            assert_eq!(keys.sample(t), keys.sample(t));
        }
    }

    #[test]
    fn test_interpolation_contract_over_grid() {
        let keys = list(&[(0.2, 1.0), (0.3, 5.0), (0.6, 2.0), (0.8, 4.0)]);
        let k = keys.keys();
        for i in 0..=100 {
            let t = i as f64 / 100.0;
            let v = keys.sample(t).unwrap();
            if t <= k[0].time {
                assert_eq!(v, k[0].value);
            } else if t >= k[k.len() - 1].time {
                assert_eq!(v, k[k.len() - 1].value);
            } else {
                let j = k.iter().rposition(|key| key.time <= t).unwrap();
                let (a, b) = (&k[j], &k[j + 1]);
                let expected = a.value + (b.value - a.value) * (t - a.time) / (b.time - a.time);
                assert!((v - expected).abs() < 1e-9, "t={} v={} expected={}", t, v, expected);
            }
        }
    }

    #[test]
    fn test_nan_query_samples_start() {
        let keys = list(&[(0.0, 1.0), (1.0, 2.0)]);
        assert_eq!(keys.sample(f64::NAN), Some(1.0));
    }

    #[test]
    fn test_insert_seeds_from_base_when_empty() {
        let mut keys: KeyframeList<f64> = KeyframeList::new();
        let idx = keys.insert_at(0.3, &4.0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(keys.keys()[0], Keyframe::new(0.3, 4.0));
    }

    #[test]
    fn test_insert_seeds_from_interpolated_value() {
        let mut keys = list(&[(0.0, 0.0), (1.0, 10.0)]);
        let idx = keys.insert_at(0.5, &99.0).unwrap();
        assert_eq!(idx, 1);
        assert!((keys.keys()[1].value - 5.0).abs() < 1e-9);
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_insert_rejects_close_keyframe() {
        let mut keys = list(&[(0.5, 1.0)]);
        let err = keys.insert_at(0.51, &0.0).unwrap_err();
        assert!(matches!(err, MontageError::KeyframeTooClose { .. }));
        assert!(keys.insert(Keyframe::new(0.5, 2.0)).is_err());
        assert_eq!(keys.len(), 1);
        assert!(keys.insert_at(0.53, &0.0).is_ok());
    }

    #[test]
    fn test_insert_clamps_time() {
        let mut keys: KeyframeList<f64> = KeyframeList::new();
        keys.insert_at(1.7, &1.0).unwrap();
        assert_eq!(keys.keys()[0].time, 1.0);
    }

    #[test]
    fn test_move_resorts_and_keeps_arrival_order() {
        let mut keys = list(&[(0.1, 1.0), (0.5, 2.0), (0.9, 3.0)]);
        let idx = keys.move_keyframe(0, 0.95).unwrap();
        assert_eq!(idx, 2);
        let times: Vec<f64> = keys.keys().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.5, 0.9, 0.95]);

        // Moving onto an occupied time lands after the existing keyframe.
        let idx = keys.move_keyframe(0, 0.9).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(keys.keys()[0].value, 3.0);
        assert_eq!(keys.keys()[1].value, 2.0);
    }

    #[test]
    fn test_equal_times_sample_without_division() {
        let keys = list(&[(0.0, 0.0), (0.5, 1.0), (0.5, 3.0), (1.0, 5.0)]);
        // Later of the equal pair wins on its right side.
        assert!((keys.sample(0.75).unwrap() - 4.0).abs() < 1e-9);
        assert!((keys.sample(0.25).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_remove_and_set_value() {
        let mut keys = list(&[(0.0, 1.0), (1.0, 2.0)]);
        keys.set_value(1, 4.0).unwrap();
        assert_eq!(keys.sample(1.0), Some(4.0));
        let removed = keys.remove(0).unwrap();
        assert_eq!(removed.value, 1.0);
        assert!(matches!(keys.remove(5), Err(MontageError::NotFound(_))));
    }

    #[test]
    fn test_split_preserves_animation() {
        let keys = list(&[(0.0, 0.0), (1.0, 10.0)]);
        let (left, right) = keys.split_at(0.4);

        assert_eq!(left.keys().len(), 2);
        assert!((left.sample(1.0).unwrap() - 4.0).abs() < 1e-9);
        assert!((left.sample(0.5).unwrap() - 2.0).abs() < 1e-9);

        assert_eq!(right.keys()[0].time, 0.0);
        assert!((right.sample(0.0).unwrap() - 4.0).abs() < 1e-9);
        assert!((right.sample(0.5).unwrap() - 7.0).abs() < 1e-9);
        assert_eq!(right.sample(1.0), Some(10.0));
    }

    #[test]
    fn test_split_empty() {
        let keys: KeyframeList<f64> = KeyframeList::new();
        let (left, right) = keys.split_at(0.5);
        assert!(left.is_empty() && right.is_empty());
    }

    #[test]
    fn test_deserialize_sorts() {
        let keys: KeyframeList<f64> =
            serde_json::from_str(r#"[{"time":0.8,"value":2.0},{"time":0.2,"value":1.0}]"#).unwrap();
        assert_eq!(keys.keys()[0].time, 0.2);
        assert_eq!(
            serde_json::to_string(&keys).unwrap(),
            r#"[{"time":0.2,"value":1.0},{"time":0.8,"value":2.0}]"#
        );
    }

    #[test]
    fn test_normalized_guards_zero_duration() {
        assert_eq!(normalized(1.0, 0.0), 0.0);
        assert_eq!(normalized(1.0, -2.0), 0.0);
        assert_eq!(normalized(1.0, 4.0), 0.25);
        assert_eq!(normalized(9.0, 4.0), 1.0);
    }
}
