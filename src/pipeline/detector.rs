//! Detector wrapper (C6): invokes the out-of-scope detection primitive,
//! filters by minimum confidence, and exposes runtime-mergeable properties.

use crate::config::ClassifierProps;
use super::frame::Detection;

/// The contract the detection primitive exposes (§1): `detect(gray) ->
/// (rects, scores)`. Implemented by an out-of-scope collaborator; the core
/// only depends on this trait.
pub trait DetectionPrimitive: Send {
    fn detect_raw(&mut self, gray: &[u8], width: u32, height: u32, props: &ClassifierProps) -> Vec<Detection>;
}

/// Wraps a [`DetectionPrimitive`], applying the minimum-confidence
/// post-filter and runtime property merging described in §4.6.
pub struct DetectorWrapper<D: DetectionPrimitive> {
    primitive: D,
    props: ClassifierProps,
}

impl<D: DetectionPrimitive> DetectorWrapper<D> {
    pub fn new(primitive: D, props: ClassifierProps) -> Self {
        DetectorWrapper { primitive, props }
    }

    pub fn properties(&self) -> &ClassifierProps {
        &self.props
    }

    /// Merges a partial property update over the current settings, warning
    /// (non-fatal) on any key it does not recognize.
    pub fn set_properties(&mut self, updates: &[(&str, PropertyUpdate)]) {
        for (key, value) in updates {
            match (*key, value) {
                ("minNeighbors", PropertyUpdate::Int(n)) => self.props.min_neighbors = *n as i32,
                ("scaleFactor", PropertyUpdate::Float(f)) => self.props.scale_factor = *f as f32,
                ("minLevel", PropertyUpdate::Float(f)) => self.props.min_level = *f as f32,
                ("minObjectSize", PropertyUpdate::Size(w, h)) => self.props.min_object_size = (*w, *h),
                ("maxObjectSize", PropertyUpdate::Size(w, h)) => self.props.max_object_size = (*w, *h),
                (other, _) => log::warn!("ignoring unknown classifier property {other:?}"),
            }
        }
    }

    pub fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<Detection> {
        self.primitive
            .detect_raw(gray, width, height, &self.props)
            .into_iter()
            .filter(|d| d.score >= self.props.min_level)
            .collect()
    }
}

pub enum PropertyUpdate {
    Int(i64),
    Float(f64),
    Size(u32, u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<Detection>);

    impl DetectionPrimitive for FixedDetector {
        fn detect_raw(&mut self, _gray: &[u8], _w: u32, _h: u32, _props: &ClassifierProps) -> Vec<Detection> {
            self.0.clone()
        }
    }

    #[test]
    fn filters_below_min_level() {
        let dets = vec![
            Detection::new(0, 0, 10, 10, 2.0),
            Detection::new(0, 0, 10, 10, 0.5),
        ];
        let mut props = ClassifierProps::default();
        props.min_level = 1.0;
        let mut wrapper = DetectorWrapper::new(FixedDetector(dets), props);

        let result = wrapper.detect(&[], 100, 100);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].score, 2.0);
    }

    #[test]
    fn set_properties_merges_and_warns_on_unknown() {
        let mut wrapper = DetectorWrapper::new(FixedDetector(vec![]), ClassifierProps::default());
        wrapper.set_properties(&[
            ("minLevel", PropertyUpdate::Float(3.0)),
            ("bogusKey", PropertyUpdate::Int(1)),
        ]);
        assert_eq!(wrapper.properties().min_level, 3.0);
    }
}
