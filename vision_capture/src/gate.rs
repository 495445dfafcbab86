use crate::{
    frame::Frame,
    selection::EngineSelection,
    serializer::{ClassificationRequest, DispatchSerializer},
    telemetry::Metrics,
};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Slot {
    occupied: AtomicBool,
    idle: Notify,
    accepted: AtomicU64,
    rejected_busy: AtomicU64,
    rejected_tracking: AtomicU64,
    dropped: AtomicU64,
    released: AtomicU64,
}

impl Slot {
    fn release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.occupied.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Exclusive hold on the gate's single slot together with the frame in it.
/// Dropping the lease releases the slot, whichever way the holder exits.
#[derive(Debug)]
pub struct SlotLease {
    frame: Frame,
    slot: Arc<Slot>,
}

impl SlotLease {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.slot.release();
        tracing::trace!(sequence = self.frame.sequence, "Frame slot released");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub accepted: u64,
    pub rejected_busy: u64,
    pub rejected_tracking: u64,
    /// Claimed the slot but could not be handed to the worker.
    pub dropped: u64,
    pub released: u64,
}

/// Admits at most one frame at a time into classification and drops the
/// rest. Offering never blocks.
pub struct FrameGate {
    slot: Arc<Slot>,
    selection: EngineSelection,
    serializer: DispatchSerializer,
    metrics: Arc<Metrics>,
}

impl FrameGate {
    pub fn new(
        selection: EngineSelection,
        serializer: DispatchSerializer,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            slot: Arc::new(Slot::default()),
            selection,
            serializer,
            metrics,
        }
    }

    pub fn offer(&self, frame: Frame) -> bool {
        if !frame.tracking.is_usable() {
            self.slot.rejected_tracking.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_frame_offered("rejected_tracking");
            tracing::trace!(sequence = frame.sequence, "Frame rejected, tracking not usable");
            return false;
        }

        if self
            .slot
            .occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.slot.rejected_busy.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_frame_offered("rejected_busy");
            tracing::trace!(sequence = frame.sequence, "Frame rejected, slot occupied");
            return false;
        }
        let sequence = frame.sequence;
        let lease = SlotLease {
            frame,
            slot: self.slot.clone(),
        };
        let request = ClassificationRequest::new(lease, self.selection.snapshot());

        // a failed submit drops the request, and the lease with it
        match self.serializer.submit(request) {
            Ok(()) => {
                self.slot.accepted.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_frame_offered("accepted");
                tracing::debug!(sequence, "Frame admitted for classification");
                true
            }
            Err(e) => {
                self.slot.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_frame_offered("dropped");
                tracing::error!(sequence, "Failed to submit frame: {}", e);
                false
            }
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.slot.occupied.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            accepted: self.slot.accepted.load(Ordering::Relaxed),
            rejected_busy: self.slot.rejected_busy.load(Ordering::Relaxed),
            rejected_tracking: self.slot.rejected_tracking.load(Ordering::Relaxed),
            dropped: self.slot.dropped.load(Ordering::Relaxed),
            released: self.slot.released.load(Ordering::Relaxed),
        }
    }

    /// Resolves once the slot is empty.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.slot.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_occupied() {
                return;
            }
            notified.await;
        }
    }
}
