//! Immutable collection of poses captured together.

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::geometry::PoseSample;

/// Poses of all subjects reported in one server frame.
///
/// Built once by the frame producer and never mutated after publication.
/// Iteration order is insertion order, which is either the server's arrival
/// order or the allow-list order when the object filter is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    frame_number: Option<u64>,
    captured_at: Option<SystemTime>,
    samples: Vec<PoseSample>,
    /// name -> position in `samples`
    index: HashMap<String, usize>,
}

impl FrameSnapshot {
    /// Empty snapshot for a server frame captured at `captured_at`.
    pub fn new(frame_number: u64, captured_at: SystemTime) -> Self {
        Self {
            frame_number: Some(frame_number),
            captured_at: Some(captured_at),
            samples: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Empty snapshot carrying the same frame number and timestamp.
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            frame_number: self.frame_number,
            captured_at: self.captured_at,
            samples: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert a sample, replacing any sample with the same name in place.
    pub fn add_sample(&mut self, sample: PoseSample) {
        match self.index.get(sample.name()) {
            Some(&i) => self.samples[i] = sample,
            None => {
                self.index.insert(sample.name().to_owned(), self.samples.len());
                self.samples.push(sample);
            }
        }
    }

    /// Sample for `name`, or an occluded placeholder if the frame has none.
    pub fn get_by_name(&self, name: &str) -> Cow<'_, PoseSample> {
        match self.index.get(name) {
            Some(&i) => Cow::Borrowed(&self.samples[i]),
            None => Cow::Owned(PoseSample::occluded(name)),
        }
    }

    /// `get_by_name` for each name, in the given order.
    pub fn get_by_names<'a, I, S>(&'a self, names: I) -> Vec<Cow<'a, PoseSample>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.get_by_name(name.as_ref()))
            .collect()
    }

    /// All samples, occluded ones included, in snapshot order.
    pub fn all_samples(&self) -> &[PoseSample] {
        &self.samples
    }

    /// Non-occluded samples, in snapshot order.
    pub fn visible_samples(&self) -> Vec<&PoseSample> {
        self.samples.iter().filter(|s| !s.is_occluded()).collect()
    }

    /// Subject names in snapshot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(PoseSample::name)
    }

    /// Whether the snapshot holds a sample for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for a snapshot with no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Server frame number. `None` for the empty snapshot served while disconnected.
    pub fn frame_number(&self) -> Option<u64> {
        self.frame_number
    }

    /// Wall-clock time at which the producer received the frame.
    pub fn captured_at(&self) -> Option<SystemTime> {
        self.captured_at
    }

    /// Time elapsed since capture. Advisory only.
    pub fn age(&self) -> Option<Duration> {
        let captured_at = self.captured_at?;
        Some(
            SystemTime::now()
                .duration_since(captured_at)
                .unwrap_or(Duration::ZERO),
        )
    }
}
