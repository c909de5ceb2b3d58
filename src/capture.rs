//! Capture boundary. A hook thread (global mouse listener, hotkey handler)
//! pushes captured frames through a bounded channel; the single-threaded
//! editor drains it between events. Pushing never blocks the hook thread:
//! when the editor falls behind, events are dropped and counted.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
    mpsc,
};

use image::RgbaImage;

/// Default queue depth before captures start dropping.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// One recorded interaction, produced on the hook thread.
#[derive(Clone, Debug)]
pub struct CaptureEvent {
    pub image: Arc<RgbaImage>,
    /// Click position in capture (stored) space.
    pub x: i32,
    pub y: i32,
    pub label: String,
}

pub fn capture_channel(depth: usize) -> (CaptureSender, CaptureReceiver) {
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        CaptureSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        CaptureReceiver { rx, dropped },
    )
}

#[derive(Clone)]
pub struct CaptureSender {
    tx: mpsc::SyncSender<CaptureEvent>,
    dropped: Arc<AtomicU64>,
}

impl CaptureSender {
    /// Non-blocking push. Returns false when the queue is full or the
    /// editor side is gone; the event is dropped either way.
    pub fn push(&self, event: CaptureEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped = n, "capture queue full, dropping event");
                false
            }
            Err(mpsc::TrySendError::Disconnected(_)) => false,
        }
    }
}

pub struct CaptureReceiver {
    rx: mpsc::Receiver<CaptureEvent>,
    dropped: Arc<AtomicU64>,
}

impl CaptureReceiver {
    /// Drain everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<CaptureEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            out.push(ev);
        }
        out
    }

    /// Captures dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
