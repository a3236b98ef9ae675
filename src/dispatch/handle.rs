//! Completion slots and the handles returned by `submit`.

use super::dispatcher::DispatchShared;
use super::queue::QueueKey;
use super::request::CorrelationId;
use super::result::{CancelOutcome, InferenceResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce(InferenceResult) + Send + 'static>;

enum SlotState {
    Pending,
    Callback(Callback),
    Ready(InferenceResult),
    Taken,
}

struct SlotInner {
    state: SlotState,
    cancel_requested: bool,
}

/// Where exactly one result is deposited for exactly one consumer.
pub(crate) struct CompletionSlot {
    inner: Mutex<SlotInner>,
    done: Condvar,
}

impl fmt::Debug for CompletionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = match inner.state {
            SlotState::Pending => "pending",
            SlotState::Callback(_) => "callback",
            SlotState::Ready(_) => "ready",
            SlotState::Taken => "taken",
        };
        f.debug_struct("CompletionSlot")
            .field("state", &state)
            .field("cancel_requested", &inner.cancel_requested)
            .finish()
    }
}

impl CompletionSlot {
    pub(crate) fn pending() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Pending,
                cancel_requested: false,
            }),
            done: Condvar::new(),
        })
    }

    pub(crate) fn ready(result: InferenceResult) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Ready(result),
                cancel_requested: false,
            }),
            done: Condvar::new(),
        })
    }

    /// Deposits the result. A registered callback runs on the calling thread
    /// after the slot lock has been released.
    pub(crate) fn complete(&self, mut result: InferenceResult) {
        let callback = {
            let mut inner = self.inner.lock();
            result.cancelled |= inner.cancel_requested;
            match std::mem::replace(&mut inner.state, SlotState::Taken) {
                SlotState::Pending => {
                    inner.state = SlotState::Ready(result);
                    self.done.notify_all();
                    return;
                }
                SlotState::Callback(callback) => callback,
                previous @ (SlotState::Ready(_) | SlotState::Taken) => {
                    inner.state = previous;
                    tracing::error!(
                        correlation_id = %result.correlation_id,
                        "result delivered twice; keeping the first"
                    );
                    return;
                }
            }
        };
        callback(result);
    }

    fn is_complete(&self) -> bool {
        matches!(
            self.inner.lock().state,
            SlotState::Ready(_) | SlotState::Taken
        )
    }

    /// Flags a pending slot as cancelled; returns false if it already completed.
    fn request_cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SlotState::Pending | SlotState::Callback(_) => {
                inner.cancel_requested = true;
                true
            }
            SlotState::Ready(_) | SlotState::Taken => false,
        }
    }

    fn take_until(&self, deadline: Option<Instant>) -> Option<InferenceResult> {
        let mut inner = self.inner.lock();
        loop {
            if matches!(inner.state, SlotState::Ready(_))
                && let SlotState::Ready(result) =
                    std::mem::replace(&mut inner.state, SlotState::Taken)
            {
                return Some(result);
            }
            match deadline {
                None => self.done.wait(&mut inner),
                Some(deadline) => {
                    if self.done.wait_until(&mut inner, deadline).timed_out()
                        && !matches!(inner.state, SlotState::Ready(_))
                    {
                        return None;
                    }
                }
            }
        }
    }

    fn try_take(&self) -> Option<InferenceResult> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.state, SlotState::Taken) {
            SlotState::Ready(result) => Some(result),
            other => {
                inner.state = other;
                None
            }
        }
    }

    fn set_callback(&self, callback: Callback) {
        let ready = {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut inner.state, SlotState::Taken) {
                SlotState::Ready(result) => Some(result),
                SlotState::Pending => {
                    inner.state = SlotState::Callback(callback);
                    return;
                }
                other => {
                    inner.state = other;
                    return;
                }
            }
        };
        if let Some(result) = ready {
            callback(result);
        }
    }
}

/// The submitter's side of one request.
///
/// The result is consumed exactly once, through [`wait`](Self::wait),
/// [`wait_timeout`](Self::wait_timeout), [`try_take`](Self::try_take) or
/// [`on_complete`](Self::on_complete). Dropping the handle discards the result.
pub struct InferenceHandle {
    correlation_id: CorrelationId,
    slot: Arc<CompletionSlot>,
    dispatcher: Weak<DispatchShared>,
    key: Option<QueueKey>,
}

impl fmt::Debug for InferenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceHandle")
            .field("correlation_id", &self.correlation_id)
            .field("slot", &self.slot)
            .finish()
    }
}

impl InferenceHandle {
    pub(crate) fn queued(
        correlation_id: CorrelationId,
        slot: Arc<CompletionSlot>,
        dispatcher: Weak<DispatchShared>,
        key: QueueKey,
    ) -> Self {
        Self {
            correlation_id,
            slot,
            dispatcher,
            key: Some(key),
        }
    }

    /// A handle that is already resolved.
    pub(crate) fn resolved(result: InferenceResult) -> Self {
        Self {
            correlation_id: result.correlation_id,
            slot: CompletionSlot::ready(result),
            dispatcher: Weak::new(),
            key: None,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// True once a result is available (or has been handed to a callback).
    pub fn is_complete(&self) -> bool {
        self.slot.is_complete()
    }

    /// Requests cancellation.
    ///
    /// A request still queued is removed and resolves to `Cancelled` without a
    /// native call. A dispatched request runs to completion and its result is
    /// delivered with `cancelled = true`.
    pub fn cancel(&self) -> CancelOutcome {
        if let (Some(key), Some(shared)) = (self.key, self.dispatcher.upgrade())
            && shared.cancel_queued(key)
        {
            return CancelOutcome::Dequeued;
        }
        if self.slot.request_cancel() {
            tracing::debug!(correlation_id = %self.correlation_id, "cancel requested after dispatch");
            CancelOutcome::InFlight
        } else {
            CancelOutcome::AlreadyComplete
        }
    }

    /// Blocks until the request resolves.
    pub fn wait(self) -> InferenceResult {
        match self.slot.take_until(None) {
            Some(result) => result,
            None => unreachable!("an unbounded wait only returns with a result"),
        }
    }

    /// Blocks up to `timeout`; gives the handle back if the request is still pending.
    pub fn wait_timeout(self, timeout: Duration) -> Result<InferenceResult, Self> {
        match self.slot.take_until(Some(Instant::now() + timeout)) {
            Some(result) => Ok(result),
            None => Err(self),
        }
    }

    /// Takes the result if available without blocking.
    pub fn try_take(self) -> Result<InferenceResult, Self> {
        match self.slot.try_take() {
            Some(result) => Ok(result),
            None => Err(self),
        }
    }

    /// Registers a completion callback.
    ///
    /// The callback runs exactly once: immediately on this thread if the result
    /// is already available, otherwise on the dispatcher thread that resolves
    /// the request. It is never invoked while dispatcher locks are held.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(InferenceResult) + Send + 'static,
    {
        self.slot.set_callback(Box::new(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::AdvisorError;
    use crate::dispatch::Priority;
    use std::sync::mpsc;

    fn result(id: u64) -> InferenceResult {
        InferenceResult::immediate(
            CorrelationId(id),
            Err(AdvisorError::invalid_input("test")),
        )
    }

    #[test]
    fn test_resolved_handle() {
        let handle = InferenceHandle::resolved(result(3));
        assert!(handle.is_complete());
        assert_eq!(handle.cancel(), CancelOutcome::AlreadyComplete);
        let taken = handle.try_take().unwrap();
        assert_eq!(taken.correlation_id, CorrelationId(3));
        assert!(!taken.cancelled);
    }

    #[test]
    fn test_wait_timeout_returns_handle_while_pending() {
        let slot = CompletionSlot::pending();
        let handle = InferenceHandle::queued(
            CorrelationId(1),
            Arc::clone(&slot),
            Weak::new(),
            QueueKey::new(Priority::Normal, 0),
        );
        let handle = handle.wait_timeout(Duration::from_millis(10)).unwrap_err();
        let handle = handle.try_take().unwrap_err();

        let completer = std::thread::spawn(move || slot.complete(result(1)));
        let resolved = handle.wait();
        completer.join().unwrap();
        assert_eq!(resolved.correlation_id, CorrelationId(1));
    }

    #[test]
    fn test_callback_runs_once_with_cancel_flag() {
        let slot = CompletionSlot::pending();
        let handle = InferenceHandle::queued(
            CorrelationId(9),
            Arc::clone(&slot),
            Weak::new(),
            QueueKey::new(Priority::High, 5),
        );
        assert_eq!(handle.cancel(), CancelOutcome::InFlight);

        let (tx, rx) = mpsc::channel();
        handle.on_complete(move |result| tx.send(result).unwrap());
        slot.complete(result(9));
        slot.complete(result(9));

        let delivered = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(delivered.cancelled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_callback_on_ready_slot_runs_immediately() {
        let handle = InferenceHandle::resolved(result(4));
        let (tx, rx) = mpsc::channel();
        handle.on_complete(move |result| tx.send(result.correlation_id).unwrap());
        assert_eq!(rx.try_recv().unwrap(), CorrelationId(4));
    }
}
