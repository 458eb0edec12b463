use ndarray::Array2;
use std::fmt;

/// Cover at or above which clouds are reported as present.
pub const DETECTED_PERCENT: f64 = 10.0;
/// Cover above which the image is reported as cloudy.
pub const EXCESSIVE_PERCENT: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverClass {
    None,
    Detected,
    Excessive,
}

/// Lines printed after the cloud cover figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    CloudDetected,
    Cloudy,
    Acceptable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::CloudDetected => write!(f, "Cloud is detected"),
            Verdict::Cloudy => write!(f, "Cloudy image detected (cloud cover > 15%)"),
            Verdict::Acceptable => write!(f, "Cloud cover acceptable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudCover {
    pub cloud_pixels: usize,
    pub total_pixels: usize,
    pub percent: f64,
}

impl CloudCover {
    /// An empty mask has no cloud and reports 0%.
    pub fn from_mask(cloud: &Array2<bool>) -> Self {
        let total_pixels = cloud.len();
        let cloud_pixels = cloud.iter().filter(|&&c| c).count();
        let percent = if total_pixels == 0 {
            0.0
        } else {
            100.0 * cloud_pixels as f64 / total_pixels as f64
        };

        Self {
            cloud_pixels,
            total_pixels,
            percent,
        }
    }

    pub fn class(&self) -> CoverClass {
        if self.percent > EXCESSIVE_PERCENT {
            CoverClass::Excessive
        } else if self.percent >= DETECTED_PERCENT {
            CoverClass::Detected
        } else {
            CoverClass::None
        }
    }

    /// The detection check and the cloudy/acceptable check are independent,
    /// so cover between 10% and 15% yields both "detected" and "acceptable".
    pub fn verdicts(&self) -> Vec<Verdict> {
        let mut verdicts = Vec::new();
        if self.percent >= DETECTED_PERCENT {
            verdicts.push(Verdict::CloudDetected);
        }
        if self.percent > EXCESSIVE_PERCENT {
            verdicts.push(Verdict::Cloudy);
        } else {
            verdicts.push(Verdict::Acceptable);
        }
        verdicts
    }

    /// Print the cover figure followed by each verdict on stdout.
    pub fn report(&self) {
        println!("Cloud Cover: {:.2}%", self.percent);
        for verdict in self.verdicts() {
            println!("{verdict}");
        }
    }
}
