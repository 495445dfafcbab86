use crate::{
    display::SinkHandle,
    frame::{Frame, TrackingQuality},
    gate::FrameGate,
};

/// Callbacks a frame source drives. Calls arrive one at a time.
pub trait FrameObserver: Send + Sync + 'static {
    fn on_frame(&self, frame: Frame);
    fn on_tracking_state_changed(&self, state: TrackingQuality);
}

pub struct Pipeline {
    gate: FrameGate,
    status: SinkHandle,
}

impl Pipeline {
    pub fn new(gate: FrameGate, status: SinkHandle) -> Self {
        Self { gate, status }
    }

    pub fn gate(&self) -> &FrameGate {
        &self.gate
    }
}

impl FrameObserver for Pipeline {
    fn on_frame(&self, frame: Frame) {
        self.gate.offer(frame);
    }

    fn on_tracking_state_changed(&self, state: TrackingQuality) {
        self.status
            .show(state.presentation_string().unwrap_or_default());
        match state.recommendation() {
            Some(recommendation) => {
                tracing::info!(?state, recommendation, "Tracking state changed")
            }
            None => tracing::info!(?state, "Tracking state changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        display::{SinkTarget, UiUpdate},
        frame::LimitedReason,
        publisher::ResultPublisher,
        selection::{EngineSelection, ModelSetting},
        serializer::DispatchSerializer,
        telemetry::Metrics,
        testing::{frame, ranked, FakeEngine},
    };
    use std::{collections::HashMap, sync::Arc};
    use tokio::sync::mpsc;
    use vision_classifier::{ComputeTarget, ModelId};

    fn pipeline() -> (Pipeline, mpsc::UnboundedReceiver<UiUpdate>) {
        let engine = Arc::new(FakeEngine::new(vec![("custom", ranked(&[("cat", 0.9)]))]));
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let custom = ModelId::new("custom");
        let sinks = HashMap::from([(
            custom.clone(),
            SinkHandle::new(SinkTarget::Model(custom.clone()), tx.clone()),
        )]);
        let (serializer, _worker) =
            DispatchSerializer::spawn(engine, ResultPublisher::default(), sinks, metrics.clone());
        let selection = EngineSelection::new([ModelSetting {
            id: custom,
            enabled: true,
            compute_target: ComputeTarget::Cpu,
        }]);
        let gate = FrameGate::new(selection, serializer, metrics);

        (
            Pipeline::new(gate, SinkHandle::new(SinkTarget::Status, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_tracking_changes_go_to_status_sink() {
        let (pipeline, mut rx) = pipeline();

        pipeline.on_tracking_state_changed(TrackingQuality::Limited(
            LimitedReason::ExcessiveMotion,
        ));
        pipeline.on_tracking_state_changed(TrackingQuality::Normal);

        let limited = rx.recv().await.unwrap();
        assert_eq!(limited.target, SinkTarget::Status);
        assert_eq!(limited.text, "TRACKING LIMITED\nExcessive motion");
        assert_eq!(rx.recv().await.unwrap().text, "");
    }

    #[tokio::test]
    async fn test_frames_flow_to_model_sink() {
        let (pipeline, mut rx) = pipeline();

        pipeline.on_frame(frame(1, TrackingQuality::Normal));
        pipeline.gate().wait_idle().await;

        let update = rx.recv().await.unwrap();
        assert_eq!(update.target, SinkTarget::Model(ModelId::new("custom")));
        assert_eq!(update.text, "cat : 90.00% confidence");
        assert_eq!(pipeline.gate().stats().released, 1);
    }
}
