//! Admission filtering and ordering of captured samples.

use crate::frame::FrameSnapshot;
use crate::geometry::PoseSample;

/// Producer-local copy of the filter settings, refreshed at each barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Subjects to keep, in output order.
    pub allow_list: Vec<String>,
    pub object_filter: bool,
    pub occluded_filter: bool,
}

impl FilterConfig {
    /// Both active filters must admit the sample. An occluded subject on the
    /// allow-list is dropped while the occlusion filter is on.
    pub fn admits(&self, sample: &PoseSample) -> bool {
        let visible_enough = !self.occluded_filter || !sample.is_occluded();
        let allowed =
            !self.object_filter || self.allow_list.iter().any(|name| name == sample.name());
        visible_enough && allowed
    }

    /// Reorder `frame` to follow the allow-list when the object filter is active.
    ///
    /// Allow-listed names missing from the frame become occluded placeholders,
    /// which the occlusion filter may then drop.
    pub fn arrange(&self, frame: FrameSnapshot) -> FrameSnapshot {
        if !self.object_filter {
            return frame;
        }

        let mut ordered = frame.empty_like();
        for name in &self.allow_list {
            let sample = frame.get_by_name(name);
            if self.admits(&sample) {
                ordered.add_sample(sample.into_owned());
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};
    use std::time::SystemTime;

    fn visible(name: &str) -> PoseSample {
        PoseSample::visible(name, Matrix3::identity(), Vector3::zeros()).unwrap()
    }

    fn object_filter(names: &[&str]) -> FilterConfig {
        FilterConfig {
            allow_list: names.iter().map(|n| n.to_string()).collect(),
            object_filter: true,
            occluded_filter: false,
        }
    }

    fn arrived(samples: Vec<PoseSample>) -> FrameSnapshot {
        let mut frame = FrameSnapshot::new(1, SystemTime::now());
        for sample in samples {
            frame.add_sample(sample);
        }
        frame
    }

    #[test]
    fn test_inactive_filters_admit_everything() {
        let filter = FilterConfig::default();
        assert!(filter.admits(&visible("A")));
        assert!(filter.admits(&PoseSample::occluded("B")));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let mut filter = object_filter(&["A"]);
        filter.occluded_filter = true;

        assert!(filter.admits(&visible("A")));
        assert!(!filter.admits(&PoseSample::occluded("A")));
        assert!(!filter.admits(&visible("B")));
    }

    #[test]
    fn test_arrange_follows_allow_list_order() {
        let filter = object_filter(&["B", "A"]);
        let frame = filter.arrange(arrived(vec![visible("A"), visible("B")]));

        let names: Vec<_> = frame.names().collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(frame.frame_number(), Some(1));
    }

    #[test]
    fn test_arrange_keeps_arrival_order_when_inactive() {
        let filter = FilterConfig {
            allow_list: vec!["B".into(), "A".into()],
            ..FilterConfig::default()
        };
        let frame = filter.arrange(arrived(vec![visible("A"), visible("B")]));

        let names: Vec<_> = frame.names().collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn test_missing_allow_listed_subject() {
        let mut filter = object_filter(&["A", "Ghost"]);
        let frame = filter.arrange(arrived(vec![visible("A")]));
        assert!(frame.get_by_name("Ghost").is_occluded());
        assert!(frame.contains("Ghost"));

        filter.occluded_filter = true;
        let frame = filter.arrange(arrived(vec![visible("A")]));
        assert!(!frame.contains("Ghost"));
    }
}
