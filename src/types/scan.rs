//! Lidar scan types

/// A single lidar measurement within a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sample {
    /// Angle in millidegrees (0 to 360_000)
    pub angle: i32,
    /// Distance in device units (centimeters on the Neo)
    pub distance: i32,
    /// Signal quality/intensity (unitless)
    pub signal_strength: i32,
}

impl Sample {
    /// Create new sample
    pub fn new(angle: i32, distance: i32, signal_strength: i32) -> Self {
        Self {
            angle,
            distance,
            signal_strength,
        }
    }

    /// Angle in degrees
    pub fn angle_degrees(&self) -> f32 {
        self.angle as f32 / 1000.0
    }

    /// Convert to Cartesian coordinates (x, y) in distance units
    pub fn to_cartesian(&self) -> (f32, f32) {
        let theta = self.angle_degrees().to_radians();
        let d = self.distance as f32;
        (d * theta.cos(), d * theta.sin())
    }
}

/// One full rotation's worth of samples.
///
/// Produced by [`ScanStream`](crate::device::ScanStream) and never modified
/// afterwards; the samples are only reachable through a shared slice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scan {
    samples: Vec<Sample>,
}

impl Scan {
    /// Build a scan from its samples, in rotation order
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Samples in rotation order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if scan is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate over samples
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Samples with a distance within `[min, max]`
    pub fn samples_in_range(&self, min: i32, max: i32) -> impl Iterator<Item = &Sample> {
        self.samples
            .iter()
            .filter(move |s| s.distance >= min && s.distance <= max)
    }
}

impl<'a> IntoIterator for &'a Scan {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
