use crate::{
    config::{CameraConfig, TrackingConfig},
    frame::{Frame, TrackingQuality},
    pipeline::FrameObserver,
    tracking::TrackingEstimator,
};
use bytes::Bytes;
use opencv::{core::Mat, imgproc, prelude::*, videoio};
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use vision_classifier::{Image, Orientation};

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    OpenCameraFailed(opencv::Error),
    #[error("Camera {0} is not available")]
    CameraUnavailable(i32),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(opencv::Error),
    #[error("Failed to convert frame: {0}")]
    ConvertFrameFailed(String),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
}

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::OpenCvError(err)
    }
}

/// Source of raw images for the frame poller.
pub trait ImageCapture: Send + Sync + 'static {
    /// `Ok(None)` when the device delivered an empty frame.
    fn capture_image(&self) -> impl Future<Output = Result<Option<Image>, CameraError>> + Send;
}

pub struct Camera {
    capture: Mutex<videoio::VideoCapture>,
}

impl Camera {
    pub async fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        let capture = videoio::VideoCapture::new(config.device_index, videoio::CAP_ANY)
            .map_err(CameraError::OpenCameraFailed)?;
        if !capture.is_opened()? {
            return Err(CameraError::CameraUnavailable(config.device_index));
        }
        Ok(Self {
            capture: Mutex::new(capture),
        })
    }
}

impl ImageCapture for Camera {
    async fn capture_image(&self) -> Result<Option<Image>, CameraError> {
        let mut cam = self.capture.lock().await;
        let mut frame = Mat::default();
        if !cam.read(&mut frame).map_err(CameraError::ReadFrameFailed)? || frame.empty() {
            return Ok(None);
        }
        mat_to_image(&frame).map(Some)
    }
}

fn mat_to_image(frame: &Mat) -> Result<Image, CameraError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let data = Bytes::copy_from_slice(rgb.data_bytes()?);

    Image::new(width, height, data).ok_or_else(|| {
        CameraError::ConvertFrameFailed(format!(
            "unexpected buffer size for {}x{} frame",
            width, height
        ))
    })
}

/// Polls an image source at a fixed rate and drives a `FrameObserver`:
/// tracking changes are reported before the frame that caused them.
pub struct FramePoller<C: ImageCapture> {
    capture: Arc<C>,
    observer: Arc<dyn FrameObserver>,
    poll_interval_ms: u64,
    orientation: Orientation,
    tracking: TrackingConfig,
}

impl<C: ImageCapture> FramePoller<C> {
    pub fn new(capture: Arc<C>, observer: Arc<dyn FrameObserver>, config: &CameraConfig) -> Self {
        Self {
            capture,
            observer,
            poll_interval_ms: config.get_frame_delay_ms(),
            orientation: config.orientation,
            tracking: config.tracking.clone(),
        }
    }

    pub fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut estimator = TrackingEstimator::new(self.tracking.clone());
            let mut last_state: Option<TrackingQuality> = None;
            let mut sequence = 0u64;
            let mut failing = false;

            let mut ticker = interval(Duration::from_millis(self.poll_interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (state, image) = match self.capture.capture_image().await {
                            Ok(Some(image)) => (estimator.assess(&image), Some(image)),
                            Ok(None) => (estimator.assess_missing(), None),
                            Err(e) => {
                                if !failing {
                                    tracing::warn!("Failed to capture frame: {:?}", e);
                                }
                                failing = true;
                                (estimator.assess_missing(), None)
                            }
                        };

                        if last_state != Some(state) {
                            self.observer.on_tracking_state_changed(state);
                            last_state = Some(state);
                        }

                        if let Some(image) = image {
                            if failing {
                                tracing::info!("Frame capture recovered");
                                failing = false;
                            }
                            sequence += 1;
                            self.observer
                                .on_frame(Frame::new(image, self.orientation, state, sequence));
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Camera polling received shutdown signal");
                        break;
                    }
                }
            }
            tracing::info!("Camera polling stopped");
        })
    }
}
