use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::{sleep_until, Instant},
};
use vision_classifier::ModelId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SinkTarget {
    Model(ModelId),
    Status,
    Income,
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Model(id) => write!(f, "{}", id),
            SinkTarget::Status => f.write_str("status"),
            SinkTarget::Income => f.write_str("income"),
        }
    }
}

#[derive(Debug)]
pub struct UiUpdate {
    pub target: SinkTarget,
    pub text: String,
}

/// Something that shows text. Only ever touched from the UI task.
pub trait DisplaySink: Send {
    fn show(&mut self, text: &str);
}

/// Cloneable handle that marshals text onto the UI task.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    target: SinkTarget,
    tx: mpsc::UnboundedSender<UiUpdate>,
}

impl SinkHandle {
    pub(crate) fn new(target: SinkTarget, tx: mpsc::UnboundedSender<UiUpdate>) -> Self {
        Self { target, tx }
    }

    pub fn target(&self) -> &SinkTarget {
        &self.target
    }

    pub fn show(&self, text: impl Into<String>) {
        let update = UiUpdate {
            target: self.target.clone(),
            text: text.into(),
        };
        if self.tx.send(update).is_err() {
            tracing::debug!(sink = %self.target, "UI context closed, dropping update");
        }
    }
}

pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DisplaySink for LogSink {
    fn show(&mut self, text: &str) {
        if text.is_empty() {
            tracing::debug!(sink = %self.name, "Label cleared");
        } else {
            tracing::info!(sink = %self.name, text, "Label updated");
        }
    }
}

/// Latest text of every label, readable from outside the UI task.
#[derive(Debug, Clone, Default)]
pub struct LabelBoard {
    labels: Arc<RwLock<BTreeMap<SinkTarget, String>>>,
}

impl LabelBoard {
    pub fn get(&self, target: &SinkTarget) -> Option<String> {
        self.labels.read().get(target).cloned()
    }

    pub fn model_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .read()
            .iter()
            .filter_map(|(target, text)| match target {
                SinkTarget::Model(id) => Some((id.to_string(), text.clone())),
                SinkTarget::Status | SinkTarget::Income => None,
            })
            .collect()
    }
}

pub struct BoardSink {
    board: LabelBoard,
    target: SinkTarget,
}

impl BoardSink {
    pub fn new(board: LabelBoard, target: SinkTarget) -> Self {
        Self { board, target }
    }
}

impl DisplaySink for BoardSink {
    fn show(&mut self, text: &str) {
        self.board
            .labels
            .write()
            .insert(self.target.clone(), text.to_string());
    }
}

struct Label {
    sinks: Vec<Box<dyn DisplaySink>>,
    clear_after: Option<Duration>,
    clear_at: Option<Instant>,
}

impl Label {
    fn show(&mut self, text: &str) {
        for sink in self.sinks.iter_mut() {
            sink.show(text);
        }
        self.clear_at = if text.is_empty() {
            None
        } else {
            // a delay past the clock's range means the label is never cleared
            self.clear_after
                .and_then(|after| Instant::now().checked_add(after))
        };
    }
}

/// The task that owns all display state. Labels registered with a
/// `clear_after` reset themselves to "" that long after their last text.
pub struct UiContext {
    tx: mpsc::UnboundedSender<UiUpdate>,
    rx: mpsc::UnboundedReceiver<UiUpdate>,
    labels: HashMap<SinkTarget, Label>,
}

impl Default for UiContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UiContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            labels: HashMap::new(),
        }
    }

    /// Adds a sink to the label for `target`. The last registration decides
    /// the label's clearing delay.
    pub fn register(
        &mut self,
        target: SinkTarget,
        sink: Box<dyn DisplaySink>,
        clear_after: Option<Duration>,
    ) -> SinkHandle {
        let label = self.labels.entry(target.clone()).or_insert_with(|| Label {
            sinks: Vec::new(),
            clear_after,
            clear_at: None,
        });
        label.sinks.push(sink);
        label.clear_after = clear_after;
        self.handle(target)
    }

    pub fn handle(&self, target: SinkTarget) -> SinkHandle {
        SinkHandle::new(target, self.tx.clone())
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let UiContext {
            tx,
            mut rx,
            mut labels,
        } = self;
        // only outside handles keep the channel open
        drop(tx);

        loop {
            let next_clear = labels.values().filter_map(|l| l.clear_at).min();

            tokio::select! {
                update = rx.recv() => match update {
                    Some(update) => apply(&mut labels, update),
                    None => break,
                },
                _ = wait_until(next_clear) => clear_expired(&mut labels),
                _ = shutdown_rx.recv() => {
                    tracing::info!("UI context received shutdown signal");
                    break;
                }
            }
        }
        tracing::info!("UI context stopped");
    }
}

fn apply(labels: &mut HashMap<SinkTarget, Label>, update: UiUpdate) {
    match labels.get_mut(&update.target) {
        Some(label) => label.show(&update.text),
        None => tracing::debug!(sink = %update.target, "No sink registered"),
    }
}

fn clear_expired(labels: &mut HashMap<SinkTarget, Label>) {
    let now = Instant::now();
    for label in labels.values_mut() {
        if label.clear_at.is_some_and(|at| at <= now) {
            label.show("");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
