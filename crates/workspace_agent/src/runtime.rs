//! Runs one model request on a worker thread while the session thread keeps
//! ownership of rendering and history.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use model_transport::{ModelRequest, ModelTransport, RequestId, StreamFragment, TransportError};
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);
/// Queued events folded into one wakeup before the loop re-checks interrupts.
const MAX_DRAIN: usize = 1024;

enum WorkerEvent {
    Fragment(StreamFragment),
    Finished(Result<(), TransportError>),
}

/// Drives [`ModelTransport::stream`] off-thread and relays fragments back in
/// provider order.
///
/// Only one request runs at a time: [`RequestRunner::run`] blocks until the
/// worker finishes or the interrupt flag is observed. Fragments that arrive
/// faster than one frame interval are handed over together, so a fast
/// provider costs one repaint per frame instead of one per token.
pub struct RequestRunner {
    transport: Arc<dyn ModelTransport>,
    poll_interval: Duration,
    frame_interval: Duration,
    cancel_grace: Duration,
}

impl RequestRunner {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    pub fn with_cancel_grace(mut self, cancel_grace: Duration) -> Self {
        self.cancel_grace = cancel_grace;
        self
    }

    /// Minimum spacing between two deliveries. Zero delivers every wakeup.
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    /// Streams `request`, calling `on_batch` with fragments in arrival order.
    ///
    /// The first batch is delivered as soon as it arrives; later ones at most
    /// once per frame interval, with whatever is still queued flushed when
    /// the transport finishes. Once `interrupt` is set no further batches are
    /// delivered, the transport's cancel flag is raised, and the call returns
    /// [`TransportError::Cancelled`] within the grace period even if the
    /// transport ignores cancellation.
    pub fn run(
        &self,
        request: ModelRequest,
        interrupt: &AtomicBool,
        on_batch: &mut dyn FnMut(Vec<StreamFragment>),
    ) -> Result<(), TransportError> {
        let request_id = request.request_id;
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        self.spawn_worker(request, Arc::clone(&cancel), tx)?;

        let mut cancel_deadline: Option<Instant> = None;
        let mut pending: Vec<StreamFragment> = Vec::new();
        let mut last_delivery: Option<Instant> = None;
        loop {
            if cancel_deadline.is_none() && interrupt.load(Ordering::Acquire) {
                debug!(request_id, "interrupt observed, cancelling request");
                cancel.store(true, Ordering::Release);
                cancel_deadline = Some(Instant::now() + self.cancel_grace);
                pending.clear();
            }

            let mut events = Vec::new();
            match rx.recv_timeout(self.wait_for(&pending, last_delivery)) {
                Ok(event) => {
                    events.push(event);
                    events.extend(rx.try_iter().take(MAX_DRAIN));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        warn!(request_id, "transport ignored cancellation, detaching worker");
                        return Err(TransportError::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if cancel_deadline.is_some() {
                        return Err(TransportError::Cancelled);
                    }
                    return Err(TransportError::Request(
                        "model worker exited without a result".to_string(),
                    ));
                }
            }

            let mut finished = None;
            for event in events {
                match event {
                    WorkerEvent::Fragment(fragment) => {
                        if cancel_deadline.is_none() {
                            pending.push(fragment);
                        }
                    }
                    WorkerEvent::Finished(outcome) => finished = Some(outcome),
                }
            }

            if let Some(outcome) = finished {
                if cancel_deadline.is_some() {
                    return Err(TransportError::Cancelled);
                }
                if !pending.is_empty() {
                    on_batch(std::mem::take(&mut pending));
                }
                return outcome;
            }

            let frame_due = last_delivery.map_or(true, |at| at.elapsed() >= self.frame_interval);
            if !pending.is_empty() && frame_due {
                on_batch(std::mem::take(&mut pending));
                last_delivery = Some(Instant::now());
            }
        }
    }

    /// How long to block for the next event: never past a due frame.
    fn wait_for(&self, pending: &[StreamFragment], last_delivery: Option<Instant>) -> Duration {
        match last_delivery {
            Some(at) if !pending.is_empty() => self
                .poll_interval
                .min(self.frame_interval.saturating_sub(at.elapsed())),
            _ => self.poll_interval,
        }
    }

    fn spawn_worker(
        &self,
        request: ModelRequest,
        cancel: Arc<AtomicBool>,
        tx: mpsc::Sender<WorkerEvent>,
    ) -> Result<(), TransportError> {
        let request_id: RequestId = request.request_id;
        let transport = Arc::clone(&self.transport);
        thread::Builder::new()
            .name(format!("workspace-agent-request-{request_id}"))
            .spawn(move || {
                let fragments = tx.clone();
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    transport.stream(request, cancel, &mut |fragment| {
                        let _ = fragments.send(WorkerEvent::Fragment(fragment));
                    })
                }));
                let outcome = outcome.unwrap_or_else(|_| {
                    Err(TransportError::Request("model transport panicked".to_string()))
                });
                let _ = tx.send(WorkerEvent::Finished(outcome));
            })
            .map(|_| ())
            .map_err(|error| {
                TransportError::Request(format!("failed to spawn model worker: {error}"))
            })
    }
}
