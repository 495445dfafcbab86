use crate::{
    config::TrackingConfig,
    frame::{LimitedReason, TrackingQuality},
};
use vision_classifier::Image;

const GRID: u32 = 32;

/// Derives a tracking quality for a plain camera feed from luma statistics
/// sampled on a coarse grid.
pub struct TrackingEstimator {
    config: TrackingConfig,
    frames_seen: u64,
    previous: Option<Vec<f32>>,
}

impl TrackingEstimator {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            frames_seen: 0,
            previous: None,
        }
    }

    pub fn assess(&mut self, image: &Image) -> TrackingQuality {
        let samples = sample_luma(image);
        self.frames_seen += 1;

        let motion = self
            .previous
            .as_ref()
            .filter(|prev| prev.len() == samples.len())
            .map(|prev| mean_abs_diff(prev, &samples));
        let detail = std_dev(&samples);
        self.previous = Some(samples);

        if self.frames_seen <= self.config.warmup_frames as u64 {
            return TrackingQuality::Limited(LimitedReason::Initializing);
        }
        if detail < self.config.min_detail {
            return TrackingQuality::Limited(LimitedReason::InsufficientFeatures);
        }
        if motion.is_some_and(|m| m > self.config.max_motion) {
            return TrackingQuality::Limited(LimitedReason::ExcessiveMotion);
        }
        TrackingQuality::Normal
    }

    /// Called when the source produced no image.
    pub fn assess_missing(&mut self) -> TrackingQuality {
        self.previous = None;
        if self.frames_seen == 0 {
            TrackingQuality::NotAvailable
        } else {
            TrackingQuality::Limited(LimitedReason::Relocalizing)
        }
    }
}

fn sample_luma(image: &Image) -> Vec<f32> {
    let (width, height) = (image.width(), image.height());
    let (cols, rows) = (GRID.min(width), GRID.min(height));
    let data = image.data();

    let mut samples = Vec::with_capacity((cols * rows) as usize);
    for gy in 0..rows {
        let y = ((2 * gy + 1) * height / (2 * rows)).min(height - 1);
        for gx in 0..cols {
            let x = ((2 * gx + 1) * width / (2 * cols)).min(width - 1);
            let idx = ((y * width + x) * 3) as usize;
            let (r, g, b) = (data[idx] as f32, data[idx + 1] as f32, data[idx + 2] as f32);
            samples.push(0.299 * r + 0.587 * g + 0.114 * b);
        }
    }
    samples
}

fn std_dev(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    (samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n).sqrt()
}

fn mean_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f32>() / a.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TrackingConfig {
        TrackingConfig {
            warmup_frames: 2,
            min_detail: 6.0,
            max_motion: 40.0,
        }
    }

    fn uniform(value: u8) -> Image {
        Image::new(64, 64, vec![value; 64 * 64 * 3]).unwrap()
    }

    fn stripes(invert: bool) -> Image {
        let mut data = Vec::with_capacity(64 * 64 * 3);
        for _y in 0..64 {
            for x in 0..64u32 {
                let bright = (x / 4) % 2 == 0;
                let value = if bright != invert { 220 } else { 30 };
                data.extend_from_slice(&[value, value, value]);
            }
        }
        Image::new(64, 64, data).unwrap()
    }

    #[test]
    fn test_warmup_then_normal() {
        let mut estimator = TrackingEstimator::new(config());
        let frame = stripes(false);

        assert_eq!(
            estimator.assess(&frame),
            TrackingQuality::Limited(LimitedReason::Initializing)
        );
        assert_eq!(
            estimator.assess(&frame),
            TrackingQuality::Limited(LimitedReason::Initializing)
        );
        assert_eq!(estimator.assess(&frame), TrackingQuality::Normal);
    }

    #[test]
    fn test_flat_frame_has_low_detail() {
        let mut estimator = TrackingEstimator::new(config());
        for _ in 0..2 {
            estimator.assess(&uniform(128));
        }
        assert_eq!(
            estimator.assess(&uniform(128)),
            TrackingQuality::Limited(LimitedReason::InsufficientFeatures)
        );
    }

    #[test]
    fn test_large_change_is_excessive_motion() {
        let mut estimator = TrackingEstimator::new(config());
        for _ in 0..3 {
            estimator.assess(&stripes(false));
        }
        assert_eq!(
            estimator.assess(&stripes(true)),
            TrackingQuality::Limited(LimitedReason::ExcessiveMotion)
        );
        assert_eq!(estimator.assess(&stripes(true)), TrackingQuality::Normal);
    }

    #[test]
    fn test_missing_frames() {
        let mut estimator = TrackingEstimator::new(config());
        assert_eq!(estimator.assess_missing(), TrackingQuality::NotAvailable);

        estimator.assess(&stripes(false));
        assert_eq!(
            estimator.assess_missing(),
            TrackingQuality::Limited(LimitedReason::Relocalizing)
        );
    }
}
