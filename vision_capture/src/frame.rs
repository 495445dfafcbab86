use serde::Serialize;
use vision_classifier::{Image, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitedReason {
    ExcessiveMotion,
    InsufficientFeatures,
    Initializing,
    Relocalizing,
}

/// How far the camera feed can currently be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum TrackingQuality {
    Normal,
    Limited(LimitedReason),
    NotAvailable,
}

impl TrackingQuality {
    pub fn is_usable(&self) -> bool {
        matches!(self, TrackingQuality::Normal)
    }

    pub fn presentation_string(&self) -> Option<&'static str> {
        match self {
            TrackingQuality::NotAvailable => Some("TRACKING UNAVAILABLE"),
            TrackingQuality::Normal => None,
            TrackingQuality::Limited(LimitedReason::ExcessiveMotion) => {
                Some("TRACKING LIMITED\nExcessive motion")
            }
            TrackingQuality::Limited(LimitedReason::InsufficientFeatures) => {
                Some("TRACKING LIMITED\nLow detail")
            }
            TrackingQuality::Limited(LimitedReason::Initializing) => Some("Initializing"),
            TrackingQuality::Limited(LimitedReason::Relocalizing) => {
                Some("Recovering from interruption")
            }
        }
    }

    pub fn recommendation(&self) -> Option<&'static str> {
        match self {
            TrackingQuality::Limited(LimitedReason::ExcessiveMotion) => {
                Some("Try slowing down your movement, or reset the session.")
            }
            TrackingQuality::Limited(LimitedReason::InsufficientFeatures) => {
                Some("Try pointing at a flat surface, or reset the session.")
            }
            TrackingQuality::Limited(LimitedReason::Relocalizing) => Some(
                "Return to the location where you left off or try resetting the session.",
            ),
            _ => None,
        }
    }
}

/// One captured image. Moved through the pipeline, never cloned.
#[derive(Debug)]
pub struct Frame {
    pub image: Image,
    pub orientation: Orientation,
    pub tracking: TrackingQuality,
    pub sequence: u64,
}

impl Frame {
    pub fn new(
        image: Image,
        orientation: Orientation,
        tracking: TrackingQuality,
        sequence: u64,
    ) -> Self {
        Self {
            image,
            orientation,
            tracking,
            sequence,
        }
    }
}
