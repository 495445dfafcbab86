use crate::display::SinkHandle;
use vision_classifier::{Classification, ModelId};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Turns ranked engine output into a label text. Stateless between calls.
#[derive(Debug, Clone, Copy)]
pub struct ResultPublisher {
    threshold: f32,
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ResultPublisher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// First entry, in engine order, strictly above the threshold. The engine's
    /// ranking is authoritative and is not re-sorted here.
    pub fn select_best<'a>(&self, results: &'a [Classification]) -> Option<&'a Classification> {
        results.iter().find(|c| c.confidence > self.threshold)
    }

    /// Sends the best result to `sink` on the UI context. Leaves the sink
    /// untouched when nothing clears the threshold.
    pub fn publish(
        &self,
        model: &ModelId,
        results: &[Classification],
        sink: &SinkHandle,
    ) -> Option<String> {
        let Some(best) = self.select_best(results) else {
            tracing::debug!(
                model = %model,
                candidates = results.len(),
                "No result above threshold"
            );
            return None;
        };

        let text = format_result(best);
        tracing::debug!(model = %model, text = %text, "Publishing classification");
        sink.show(text.clone());
        Some(text)
    }
}

/// `"cat, feline, housecat"` at 0.876 becomes `"cat : 87.60% confidence"`.
pub fn format_result(result: &Classification) -> String {
    let class_name = result.label.split(',').next().unwrap_or_default().trim();
    format!("{} : {:.2}% confidence", class_name, result.confidence * 100.0)
}
