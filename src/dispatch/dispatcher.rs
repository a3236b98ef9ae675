//! The inference dispatcher.
//!
//! Requests from any number of callers are queued and executed by `K` worker
//! threads against a single [`ModelSession`]. A deadline watcher thread expires
//! queued requests whose timeout passes before a worker picks them up.

use super::handle::{CompletionSlot, InferenceHandle};
use super::queue::{Job, PendingQueue, QueueKey};
use super::request::InferenceRequest;
use super::result::{InferenceOutput, InferenceResult};
use crate::cache::{CacheKey, ResultCache};
use crate::core::config::{ConfigValidatorExt, DispatchConfig};
use crate::core::errors::{AdvisorError, OpaqueError};
use crate::core::inference::{ModelSession, SessionState};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How [`Dispatcher::shutdown`] treats requests still queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every queued request before stopping.
    Drain,
    /// Resolve queued requests with `SessionClosed` without running them.
    Abort,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    submitted: AtomicU64,
    cache_hits: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub cache_hits: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    /// Resolved at submission without being queued (closed, not ready, invalid input).
    pub rejected: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared between the dispatcher, its threads and outstanding handles.
#[derive(Debug)]
pub(crate) struct DispatchShared {
    session: Arc<ModelSession>,
    cache: Option<ResultCache>,
    default_timeout: Option<Duration>,
    queue: Mutex<PendingQueue>,
    work_ready: Condvar,
    deadlines_changed: Condvar,
    counters: DispatchCounters,
}

impl DispatchShared {
    /// Removes a still-queued job and resolves it as cancelled.
    pub(crate) fn cancel_queued(&self, key: QueueKey) -> bool {
        let Some(job) = self.queue.lock().remove(key) else {
            return false;
        };
        bump(&self.counters.cancelled);
        debug!(correlation_id = %job.correlation_id, "cancelled before dispatch");
        let queued_for = job.submitted_at.elapsed();
        job.slot.complete(InferenceResult {
            correlation_id: job.correlation_id,
            outcome: Err(AdvisorError::cancelled(job.correlation_id.get())),
            cancelled: true,
            late: false,
            queued_for,
            ran_for: Duration::ZERO,
        });
        true
    }

    fn reject(&self, job: Job, error: AdvisorError) {
        let queued_for = job.submitted_at.elapsed();
        job.slot.complete(InferenceResult {
            correlation_id: job.correlation_id,
            outcome: Err(error),
            cancelled: false,
            late: false,
            queued_for,
            ran_for: Duration::ZERO,
        });
    }

    fn expire(&self, job: Job) {
        bump(&self.counters.timed_out);
        let waited = job.submitted_at.elapsed();
        debug!(correlation_id = %job.correlation_id, ?waited, "request expired in queue");
        let error = AdvisorError::timeout(job.correlation_id.get(), waited);
        self.reject(job, error);
    }

    fn worker_loop(&self) {
        loop {
            let job = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(job) = queue.pop_next() {
                        break job;
                    }
                    if queue.shutdown {
                        return;
                    }
                    self.work_ready.wait(&mut queue);
                }
            };
            self.execute(job);
        }
    }

    fn execute(&self, job: Job) {
        let started = Instant::now();
        let queued_for = started.saturating_duration_since(job.submitted_at);
        if job.deadline.is_some_and(|deadline| started >= deadline) {
            self.expire(job);
            return;
        }

        bump(&self.counters.dispatched);
        trace!(correlation_id = %job.correlation_id, ?queued_for, "dispatching request");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.session.run_versioned(&job.inputs)
        }))
        .unwrap_or_else(|_| {
            Err(AdvisorError::inference_error_builder(
                self.session.model_name(),
                "forward_pass",
            )
            .context("native call panicked")
            .build(OpaqueError("panic in native runtime".to_string())))
        });
        let finished = Instant::now();
        let late = job.deadline.is_some_and(|deadline| finished > deadline);

        let outcome = match outcome {
            Ok((tensors, version)) => {
                bump(&self.counters.succeeded);
                if let Some(cache) = &self.cache {
                    let key = match job.digest {
                        Some(digest) => CacheKey {
                            version: version.clone(),
                            digest,
                        },
                        None => CacheKey::new(version.clone(), &job.inputs),
                    };
                    cache.insert(key, Arc::clone(&tensors));
                }
                Ok(InferenceOutput {
                    tensors,
                    model_version: version,
                    from_cache: false,
                })
            }
            Err(error) => {
                bump(&self.counters.failed);
                debug!(correlation_id = %job.correlation_id, %error, "request failed");
                Err(error)
            }
        };

        job.slot.complete(InferenceResult {
            correlation_id: job.correlation_id,
            outcome,
            cancelled: false,
            late,
            queued_for,
            ran_for: finished - started,
        });
    }

    fn deadline_loop(&self) {
        loop {
            let expired = {
                let mut queue = self.queue.lock();
                loop {
                    if queue.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    let expired = queue.take_expired(now);
                    if !expired.is_empty() {
                        break expired;
                    }
                    match queue.next_deadline() {
                        Some(deadline) => {
                            self.deadlines_changed.wait_until(&mut queue, deadline);
                        }
                        None => self.deadlines_changed.wait(&mut queue),
                    }
                }
            };
            for job in expired {
                self.expire(job);
            }
        }
    }
}

/// Serializes concurrent requests against one model session.
#[derive(Debug)]
pub struct Dispatcher {
    shared: Arc<DispatchShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    max_concurrency: usize,
}

impl Dispatcher {
    /// Validates the configuration and starts the worker and deadline threads.
    pub fn new(session: Arc<ModelSession>, config: DispatchConfig) -> Result<Self, AdvisorError> {
        let config = config.validated()?;
        let cache = config.cache.clone().map(ResultCache::new).transpose()?;
        let shared = Arc::new(DispatchShared {
            session,
            cache,
            default_timeout: config.default_timeout_duration(),
            queue: Mutex::new(PendingQueue::new()),
            work_ready: Condvar::new(),
            deadlines_changed: Condvar::new(),
            counters: DispatchCounters::default(),
        });

        let model = shared.session.model_name().to_string();
        let mut threads = Vec::with_capacity(config.max_concurrency + 1);
        for index in 0..config.max_concurrency {
            let worker = Arc::clone(&shared);
            let thread = std::thread::Builder::new()
                .name(format!("{model}-worker-{index}"))
                .spawn(move || worker.worker_loop())?;
            threads.push(thread);
        }
        let watcher = Arc::clone(&shared);
        threads.push(
            std::thread::Builder::new()
                .name(format!("{model}-deadlines"))
                .spawn(move || watcher.deadline_loop())?,
        );

        info!(
            model = %model,
            max_concurrency = config.max_concurrency,
            cache = shared.cache.is_some(),
            "dispatcher started"
        );

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
            max_concurrency: config.max_concurrency,
        })
    }

    /// The session requests are run against.
    pub fn session(&self) -> &Arc<ModelSession> {
        &self.shared.session
    }

    /// The result cache, when enabled.
    pub fn cache(&self) -> Option<&ResultCache> {
        self.shared.cache.as_ref()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Number of requests waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Submits a request without blocking on the native call.
    ///
    /// Requests against a closing or closed session, or submitted after
    /// shutdown began, resolve immediately with `SessionClosed`; against a
    /// session without a model, with `SessionNotReady`. Inputs that do not fit
    /// the contract resolve immediately with the validation error. A cache hit
    /// resolves immediately with the cached outputs.
    pub fn submit(&self, request: InferenceRequest) -> InferenceHandle {
        let shared = &self.shared;
        bump(&shared.counters.submitted);
        let correlation_id = request.correlation_id();
        let session = &shared.session;

        let reject = |error: AdvisorError| {
            bump(&shared.counters.rejected);
            debug!(correlation_id = %correlation_id, %error, "request rejected at submission");
            InferenceHandle::resolved(InferenceResult::immediate(correlation_id, Err(error)))
        };

        match session.state() {
            SessionState::Ready => {}
            state @ (SessionState::Closing | SessionState::Closed) => {
                return reject(AdvisorError::session_closed(session.model_name(), state));
            }
            state @ (SessionState::Unloaded | SessionState::Loading) => {
                return reject(AdvisorError::session_not_ready(state));
            }
        }
        if let Err(error) = session.contract().check_inputs(request.inputs()) {
            return reject(error);
        }

        let mut digest = None;
        if let Some(cache) = &shared.cache
            && let Some(version) = session.model_version()
        {
            let key = CacheKey::new(version, request.inputs());
            if let Some(tensors) = cache.lookup(&key) {
                bump(&shared.counters.cache_hits);
                trace!(correlation_id = %correlation_id, "served from cache");
                return InferenceHandle::resolved(InferenceResult::immediate(
                    correlation_id,
                    Ok(InferenceOutput {
                        tensors,
                        model_version: key.version,
                        from_cache: true,
                    }),
                ));
            }
            digest = Some(key.digest);
        }

        let priority = request.priority();
        let submitted_at = Instant::now();
        let deadline = request
            .timeout()
            .or(shared.default_timeout)
            .map(|timeout| submitted_at + timeout);
        let slot = CompletionSlot::pending();
        let job = Job {
            correlation_id,
            inputs: request.into_inputs(),
            submitted_at,
            deadline,
            digest,
            slot: Arc::clone(&slot),
        };

        let key = {
            let mut queue = shared.queue.lock();
            if !queue.accepting {
                drop(queue);
                return reject(AdvisorError::session_closed(
                    session.model_name(),
                    "shutting down",
                ));
            }
            let key = queue.push(priority, job);
            if deadline.is_some() {
                shared.deadlines_changed.notify_one();
            }
            shared.work_ready.notify_one();
            key
        };
        trace!(correlation_id = %correlation_id, ?priority, "request queued");

        InferenceHandle::queued(correlation_id, slot, Arc::downgrade(shared), key)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting requests, settles the queue according to `mode` and
    /// joins the dispatcher threads. Idempotent.
    pub fn shutdown(&self, mode: ShutdownMode) {
        let aborted = {
            let mut queue = self.shared.queue.lock();
            queue.accepting = false;
            queue.shutdown = true;
            let aborted = match mode {
                ShutdownMode::Drain => Vec::new(),
                ShutdownMode::Abort => queue.drain(),
            };
            self.shared.work_ready.notify_all();
            self.shared.deadlines_changed.notify_all();
            aborted
        };

        if !aborted.is_empty() {
            warn!(count = aborted.len(), "aborting queued requests");
        }
        let model = self.shared.session.model_name().to_string();
        for job in aborted {
            self.shared.reject(
                job,
                AdvisorError::session_closed(&model, "shutting down"),
            );
        }

        let threads = std::mem::take(&mut *self.threads.lock());
        let current = std::thread::current().id();
        for thread in threads {
            if thread.thread().id() == current {
                continue;
            }
            if thread.join().is_err() {
                warn!(model = %model, "dispatcher thread panicked");
            }
        }
        debug!(model = %model, ?mode, "dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Abort);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CacheConfig, SessionConfig};
    use crate::core::errors::ErrorKind;
    use crate::core::tensor::TensorDescriptor;
    use crate::dispatch::{CancelOutcome, Priority};
    use crate::test_support::{ScriptedRuntime, echo_contract, echo_input};
    use std::sync::mpsc;

    fn ready_session(runtime: &ScriptedRuntime) -> Arc<ModelSession> {
        let config = SessionConfig::new(echo_contract())
            .model_name("echo")
            .warmup(false);
        let session = Arc::new(ModelSession::new(Arc::new(runtime.clone()), config).unwrap());
        session.load(&ScriptedRuntime::valid_source()).unwrap();
        session
    }

    fn request(value: f32) -> InferenceRequest {
        InferenceRequest::new(vec![echo_input(&[value; 4])])
    }

    fn first_value(result: &InferenceResult) -> f32 {
        let output = result.outcome.as_ref().unwrap();
        output.tensors[0].to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_single_worker_completes_in_submission_order() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let (tx, rx) = mpsc::channel();
        let mut ids = Vec::new();
        for value in [1.0, 2.0, 3.0] {
            let handle = dispatcher.submit(request(value));
            ids.push(handle.correlation_id());
            let tx = tx.clone();
            handle.on_complete(move |result| tx.send(result).unwrap());
        }
        runtime.wait_for_blocked(1);
        gate.release();

        let completed: Vec<InferenceResult> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        let completed_ids: Vec<_> = completed.iter().map(|r| r.correlation_id).collect();
        assert_eq!(completed_ids, ids);
        let values: Vec<f32> = completed.iter().map(first_value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(runtime.max_concurrent(), 1);
    }

    #[test]
    fn test_priority_overtakes_queued_requests() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let blocker = dispatcher.submit(request(0.0));
        runtime.wait_for_blocked(1);
        let low = dispatcher.submit(request(1.0).with_priority(Priority::Low));
        let normal = dispatcher.submit(request(2.0));
        let high = dispatcher.submit(request(3.0).with_priority(Priority::High));
        gate.release();

        for handle in [blocker, low, normal, high] {
            assert!(handle.wait().is_ok());
        }
        assert_eq!(runtime.seen(), vec![0.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_concurrency_bound() {
        let runtime = ScriptedRuntime::new();
        runtime.set_latency(Duration::from_millis(20));
        let dispatcher = Dispatcher::new(
            ready_session(&runtime),
            DispatchConfig::new().max_concurrency(2),
        )
        .unwrap();

        let handles: Vec<_> = (0..6).map(|i| dispatcher.submit(request(i as f32))).collect();
        for handle in handles {
            assert!(handle.wait().is_ok());
        }
        assert!(runtime.max_concurrent() <= 2);
        assert_eq!(dispatcher.session().native_calls(), 6);
    }

    #[test]
    fn test_submit_after_close_is_rejected_without_native_call() {
        let runtime = ScriptedRuntime::new();
        let session = ready_session(&runtime);
        let dispatcher = Dispatcher::new(Arc::clone(&session), DispatchConfig::new()).unwrap();

        session.close();
        let result = dispatcher.submit(request(1.0)).wait();
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::SessionClosed);
        assert_eq!(runtime.runs(), 0);
        assert_eq!(dispatcher.stats().rejected, 1);
    }

    #[test]
    fn test_submit_before_load_is_not_ready() {
        let runtime = ScriptedRuntime::new();
        let config = SessionConfig::new(echo_contract()).warmup(false);
        let session = Arc::new(ModelSession::new(Arc::new(runtime.clone()), config).unwrap());
        let dispatcher = Dispatcher::new(session, DispatchConfig::new()).unwrap();

        let result = dispatcher.submit(request(1.0)).wait();
        assert_eq!(
            result.outcome.unwrap_err().kind(),
            ErrorKind::SessionNotReady
        );
    }

    #[test]
    fn test_invalid_input_rejected_at_submission() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();

        let bad = TensorDescriptor::from_values(vec![4], &[0.0f32; 4]).unwrap();
        let result = dispatcher.submit(InferenceRequest::new(vec![bad])).wait();
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::ShapeMismatch);
        assert_eq!(runtime.runs(), 0);
    }

    #[test]
    fn test_cache_hit_skips_native_call() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(
            ready_session(&runtime),
            DispatchConfig::new().cache(CacheConfig::entries(16)),
        )
        .unwrap();

        let first = dispatcher.submit(request(7.0)).wait();
        let first_output = first.outcome.unwrap();
        assert!(!first_output.from_cache);

        let second = dispatcher.submit(request(7.0)).wait();
        let second_output = second.outcome.unwrap();
        assert!(second_output.from_cache);
        assert_eq!(first_output.tensors, second_output.tensors);
        assert_eq!(first_output.model_version, second_output.model_version);
        assert_eq!(dispatcher.session().native_calls(), 1);
        assert_eq!(dispatcher.stats().cache_hits, 1);
    }

    #[test]
    fn test_cache_is_not_shared_across_reloads() {
        let runtime = ScriptedRuntime::new();
        let session = ready_session(&runtime);
        let dispatcher = Dispatcher::new(
            Arc::clone(&session),
            DispatchConfig::new().cache(CacheConfig::entries(16)),
        )
        .unwrap();

        assert!(dispatcher.submit(request(7.0)).wait().is_ok());
        session.close();
        session.reset().unwrap();
        session.load(&ScriptedRuntime::valid_source()).unwrap();

        let result = dispatcher.submit(request(7.0)).wait();
        assert!(!result.outcome.unwrap().from_cache);
        assert_eq!(session.native_calls(), 2);
    }

    #[test]
    fn test_cancel_before_dispatch_issues_no_native_call() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let blocker = dispatcher.submit(request(0.0));
        runtime.wait_for_blocked(1);
        let victim = dispatcher.submit(request(1.0));
        assert_eq!(victim.cancel(), CancelOutcome::Dequeued);
        gate.release();

        let result = victim.wait();
        assert!(result.cancelled);
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(blocker.wait().is_ok());
        assert_eq!(runtime.seen(), vec![0.0]);
        assert_eq!(dispatcher.stats().cancelled, 1);
    }

    #[test]
    fn test_cancel_after_dispatch_still_delivers() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let handle = dispatcher.submit(request(4.0));
        runtime.wait_for_blocked(1);
        assert_eq!(handle.cancel(), CancelOutcome::InFlight);
        gate.release();

        let result = handle.wait();
        assert!(result.cancelled);
        assert_eq!(first_value(&result), 4.0);
    }

    #[test]
    fn test_deadline_expires_behind_slow_requests() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let slow: Vec<_> = (0..3).map(|i| dispatcher.submit(request(i as f32))).collect();
        runtime.wait_for_blocked(1);
        let hurried = dispatcher.submit(request(9.0).with_timeout(Duration::from_millis(30)));

        // Expiry is reported while the worker is still busy.
        let result = hurried
            .wait_timeout(Duration::from_secs(5))
            .expect("deadline watcher resolves the request");
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::Timeout);
        assert!(result.queued_for >= Duration::from_millis(30));

        gate.release();
        for handle in slow {
            assert!(handle.wait().is_ok());
        }
        assert!(!runtime.seen().contains(&9.0));
        assert_eq!(dispatcher.stats().timed_out, 1);
    }

    #[test]
    fn test_deadline_passing_during_run_marks_late() {
        let runtime = ScriptedRuntime::new();
        runtime.set_latency(Duration::from_millis(50));
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();

        let result = dispatcher
            .submit(request(1.0).with_timeout(Duration::from_millis(10)))
            .wait();
        assert!(result.is_ok());
        assert!(result.late);
    }

    #[test]
    fn test_queued_requests_fail_when_session_closes_underneath() {
        let runtime = ScriptedRuntime::new();
        let session = ready_session(&runtime);
        let dispatcher = Dispatcher::new(Arc::clone(&session), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();

        let running = dispatcher.submit(request(0.0));
        runtime.wait_for_blocked(1);
        let queued = dispatcher.submit(request(1.0));
        assert_eq!(session.begin_close(), SessionState::Closing);
        gate.release();

        assert!(running.wait().is_ok());
        let result = queued.wait();
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::SessionClosed);
        assert_eq!(runtime.seen(), vec![0.0]);
        assert!(session.wait_closed(Duration::from_secs(5)));
    }

    #[test]
    fn test_shutdown_drain_and_abort() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();
        let first = dispatcher.submit(request(0.0));
        runtime.wait_for_blocked(1);
        let second = dispatcher.submit(request(1.0));
        gate.release();
        dispatcher.shutdown(ShutdownMode::Drain);
        assert!(first.wait().is_ok());
        assert!(second.wait().is_ok());

        let after = dispatcher.submit(request(2.0)).wait();
        assert_eq!(after.outcome.unwrap_err().kind(), ErrorKind::SessionClosed);

        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        let gate = runtime.hold_runs();
        let running = dispatcher.submit(request(0.0));
        runtime.wait_for_blocked(1);
        let queued = dispatcher.submit(request(1.0));
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            gate.release();
        });
        dispatcher.shutdown(ShutdownMode::Abort);
        releaser.join().unwrap();
        assert!(running.wait().is_ok());
        assert_eq!(
            queued.wait().outcome.unwrap_err().kind(),
            ErrorKind::SessionClosed
        );
    }

    #[test]
    fn test_native_failure_is_attached_to_its_own_request() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        runtime.fail_next_run(false);

        let failed = dispatcher.submit(request(1.0)).wait();
        let ok = dispatcher.submit(request(2.0)).wait();
        assert_eq!(failed.outcome.unwrap_err().kind(), ErrorKind::Inference);
        assert_eq!(first_value(&ok), 2.0);
        let stats = dispatcher.stats();
        assert_eq!((stats.succeeded, stats.failed), (1, 1));
    }

    #[test]
    fn test_native_panic_resolves_request() {
        let runtime = ScriptedRuntime::new();
        let dispatcher = Dispatcher::new(ready_session(&runtime), DispatchConfig::new()).unwrap();
        runtime.panic_next_run();

        let result = dispatcher.submit(request(1.0)).wait();
        assert_eq!(result.outcome.unwrap_err().kind(), ErrorKind::Inference);
        assert!(dispatcher.submit(request(2.0)).wait().is_ok());
    }
}
