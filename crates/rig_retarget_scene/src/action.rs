//! Keyframed animation data: actions, channels and sampling.

/// One key on one scalar channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    pub frame: f32,
    pub value: f32,
}

/// A scalar animation channel, addressed by data path plus array index
/// (`pose.bones["hips"].location` index 1 is the hips' Y location).
#[derive(Clone, Debug, Default)]
pub struct FCurve {
    pub data_path: String,
    pub index: usize,
    pub group: Option<String>,
    pub muted: bool,
    keys: Vec<Keyframe>,
}

impl FCurve {
    pub fn new(data_path: impl Into<String>, index: usize, group: Option<String>) -> Self {
        Self { data_path: data_path.into(), index, group, muted: false, keys: vec![] }
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Linear interpolation between keys, constant extrapolation outside.
    pub fn sample(&self, frame: f32) -> Option<f32> {
        let first = self.keys.first()?;
        if frame <= first.frame {
            return Some(first.value);
        }
        let last = self.keys.last()?;
        if frame >= last.frame {
            return Some(last.value);
        }
        let upper = self.keys.partition_point(|key| key.frame <= frame);
        let (a, b) = (&self.keys[upper - 1], &self.keys[upper]);
        let span = b.frame - a.frame;
        if span <= f32::EPSILON {
            return Some(a.value);
        }
        let t = (frame - a.frame) / span;
        Some(a.value + (b.value - a.value) * t)
    }

    /// Insert or replace a key, keeping the list sorted.
    pub fn insert(&mut self, frame: f32, value: f32) {
        match self.keys.binary_search_by(|key| key.frame.total_cmp(&frame)) {
            Ok(at) => self.keys[at].value = value,
            Err(at) => self.keys.insert(at, Keyframe { frame, value }),
        }
    }

    pub fn key_at(&self, frame: f32) -> Option<f32> {
        self.keys
            .iter()
            .find(|key| (key.frame - frame).abs() < 1e-4)
            .map(|key| key.value)
    }

    pub fn frame_range(&self) -> Option<(f32, f32)> {
        Some((self.keys.first()?.frame, self.keys.last()?.frame))
    }

    /// Multiply every key value, used to rescale keyed object locations.
    pub fn scale_values(&mut self, factor: f32) {
        for key in &mut self.keys {
            key.value *= factor;
        }
    }
}

/// A named set of channels.
#[derive(Clone, Debug, Default)]
pub struct Action {
    pub name: String,
    pub curves: Vec<FCurve>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), curves: vec![] }
    }

    pub fn curve(&self, data_path: &str, index: usize) -> Option<&FCurve> {
        self.curves
            .iter()
            .find(|curve| curve.data_path == data_path && curve.index == index)
    }

    pub fn curve_mut(&mut self, data_path: &str, index: usize) -> Option<&mut FCurve> {
        self.curves
            .iter_mut()
            .find(|curve| curve.data_path == data_path && curve.index == index)
    }

    pub fn ensure_curve(
        &mut self,
        data_path: &str,
        index: usize,
        group: Option<&str>,
    ) -> &mut FCurve {
        let position = self
            .curves
            .iter()
            .position(|curve| curve.data_path == data_path && curve.index == index);
        match position {
            Some(at) => &mut self.curves[at],
            None => {
                self.curves
                    .push(FCurve::new(data_path, index, group.map(str::to_string)));
                self.curves.last_mut().expect("just pushed")
            }
        }
    }

    /// First and last keyed frame across all channels.
    pub fn frame_range(&self) -> Option<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        for curve in &self.curves {
            if let Some((start, end)) = curve.frame_range() {
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(start), hi.max(end)),
                    None => (start, end),
                });
            }
        }
        range
    }

    /// Insert a key, coalescing with the range start when cycle-aware
    /// insertion writes an identical value at the range end.
    pub fn insert_key(
        &mut self,
        data_path: &str,
        index: usize,
        group: Option<&str>,
        frame: f32,
        value: f32,
        cycle_aware: bool,
    ) {
        if cycle_aware
            && let Some((range_start, range_end)) = self.frame_range()
            && (frame - range_end).abs() < 1e-4
            && range_end > range_start
        {
            let start_value = self
                .curve(data_path, index)
                .and_then(|curve| curve.key_at(range_start));
            if start_value.is_some_and(|start| (start - value).abs() < 1e-5) {
                return;
            }
        }
        self.ensure_curve(data_path, index, group).insert(frame, value);
    }

    /// Distinct group names, in channel order.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = vec![];
        for curve in &self.curves {
            if let Some(group) = &curve.group
                && !groups.contains(group)
            {
                groups.push(group.clone());
            }
        }
        groups
    }

    /// Rename a channel group and substitute the name inside its channels'
    /// data paths.
    pub fn rename_group(&mut self, old: &str, new: &str) {
        for curve in &mut self.curves {
            if curve.group.as_deref() == Some(old) {
                curve.group = Some(new.to_string());
                curve.data_path = curve.data_path.replace(old, new);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sampling_interpolates_and_extrapolates() {
        let mut curve = FCurve::new("location", 0, None);
        curve.insert(10.0, 1.0);
        curve.insert(20.0, 3.0);

        assert_eq!(curve.sample(5.0), Some(1.0));
        assert_eq!(curve.sample(15.0), Some(2.0));
        assert_eq!(curve.sample(25.0), Some(3.0));
        assert_eq!(FCurve::new("location", 0, None).sample(1.0), None);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut curve = FCurve::new("location", 0, None);
        curve.insert(10.0, 1.0);
        curve.insert(10.0, 2.0);
        assert_eq!(curve.keys().len(), 1);
        assert_eq!(curve.sample(10.0), Some(2.0));
    }

    #[test]
    fn cycle_aware_insert_coalesces_matching_end_key() {
        let mut action = Action::new("walk");
        action.insert_key("location", 0, None, 1.0, 5.0, false);
        action.insert_key("location", 0, None, 24.0, 0.0, false);

        // Same value as the range start: coalesced, no duplicate end key.
        action.insert_key("location", 0, None, 24.0, 5.0, true);
        assert_eq!(action.curve("location", 0).unwrap().key_at(24.0), Some(0.0));

        // A genuinely different value still lands.
        action.insert_key("location", 0, None, 24.0, 7.0, true);
        assert_eq!(action.curve("location", 0).unwrap().key_at(24.0), Some(7.0));
    }

    #[test]
    fn rename_group_rewrites_paths() {
        let mut action = Action::new("walk");
        action.insert_key(
            "pose.bones[\"hips\"].location",
            0,
            Some("hips"),
            1.0,
            0.0,
            false,
        );
        action.rename_group("hips", "pelvis");
        assert_eq!(action.groups(), vec!["pelvis".to_string()]);
        assert_eq!(action.curves[0].data_path, "pose.bones[\"pelvis\"].location");
    }
}
