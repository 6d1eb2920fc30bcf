//! Fixed-size pool of isolated execution contexts.
//!
//! Each worker is an OS thread that instantiates the compiled module anew
//! for every job, so guest code in one worker cannot observe or corrupt
//! another worker's state; the interpreter instance is the isolation
//! boundary and it never outlives the job. Jobs queue FIFO on a channel
//! shared by the workers, which yields arrival-order acquisition without a
//! separate scheduler.
//!
//! Guest code cannot be preempted mid-call. When a call outlives its
//! deadline the submitter stops waiting and reports `timeout`; the worker
//! finishes the invocation (host functions cut storage-bound guests short
//! by checking the deadline), notices the abandoned reply channel and
//! replaces itself with a fresh thread.
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Instant,
};

use parity_wasm::elements::Module;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use wasmi::ExternVal;

use super::Error;
use crate::{
    resolvers::instance_and_memory,
    runtime::{Runtime, RuntimeContext},
    storage::{Snapshot, VersionedStore},
};

/// A unit of work for a worker: one method invocation against one pinned
/// snapshot.
pub(crate) struct Job<S> {
    /// Preprocessed module shared with the cache.
    pub module: Arc<Module>,
    pub contract_id: String,
    pub method_name: String,
    /// Argument blob surfaced to the guest through `input`.
    pub input: Vec<u8>,
    pub block_height: u64,
    /// Request-scoped state view pinned at `block_height`.
    pub snapshot: Snapshot<S>,
    pub deadline: Instant,
}

/// What a worker hands back for a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerOutput {
    pub result: Vec<u8>,
    pub logs: Vec<String>,
    pub block_height: u64,
}

struct QueuedJob<S> {
    job: Job<S>,
    reply: mpsc::Sender<Result<WorkerOutput, Error>>,
}

struct PoolShared<S> {
    receiver: Mutex<mpsc::Receiver<QueuedJob<S>>>,
    next_worker_id: AtomicU64,
    max_memory: u32,
}

/// Fixed-capacity pool of view workers.
pub(crate) struct WorkerPool<S> {
    sender: Mutex<mpsc::Sender<QueuedJob<S>>>,
    shared: Arc<PoolShared<S>>,
}

impl<S> WorkerPool<S>
where
    S: VersionedStore + 'static,
{
    /// Creates a pool and eagerly spawns `worker_count` workers.
    pub(crate) fn new(worker_count: usize, max_memory: u32) -> Self {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(PoolShared {
            receiver: Mutex::new(receiver),
            next_worker_id: AtomicU64::new(0),
            max_memory,
        });
        for _ in 0..worker_count {
            spawn_worker(Arc::clone(&shared));
        }
        WorkerPool {
            sender: Mutex::new(sender),
            shared,
        }
    }

    /// Submits `job` and waits for its outcome until the job's deadline.
    pub(crate) fn execute(&self, job: Job<S>) -> Result<WorkerOutput, Error> {
        let deadline = job.deadline;
        let (reply, outcome) = mpsc::channel();
        self.sender
            .lock()
            .send(QueuedJob { job, reply })
            .map_err(|_| Error::WorkerLost)?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match outcome.recv_timeout(remaining) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::WorkerLost),
        }
    }

    /// Number of workers ever spawned; grows when workers are replaced.
    #[cfg(test)]
    pub(crate) fn spawned_workers(&self) -> u64 {
        self.shared.next_worker_id.load(Ordering::Relaxed)
    }
}

fn spawn_worker<S>(shared: Arc<PoolShared<S>>)
where
    S: VersionedStore + 'static,
{
    let worker_id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let builder = thread::Builder::new().name(format!("view-worker-{worker_id}"));
    // A failed spawn leaves the pool short one worker; queued jobs still
    // drain through the remaining ones.
    if let Err(spawn_error) = builder.spawn(move || worker_loop(shared, worker_id)) {
        error!(%spawn_error, worker_id, "unable to spawn view worker");
    }
}

fn worker_loop<S>(shared: Arc<PoolShared<S>>, worker_id: u64)
where
    S: VersionedStore + 'static,
{
    debug!(worker_id, "view worker started");
    loop {
        let queued = {
            let receiver = shared.receiver.lock();
            receiver.recv()
        };
        // The pool (and with it the sending half) was dropped.
        let Ok(QueuedJob { job, reply }) = queued else {
            break;
        };

        let deadline = job.deadline;
        // A job that outlived its deadline while queued is answered without
        // touching the sandbox; the worker did nothing wrong and stays.
        if Instant::now() >= deadline {
            let _ = reply.send(Err(Error::Timeout));
            continue;
        }

        let result = execute_job(shared.max_memory, job);
        let destroy_worker = match &result {
            Err(execution_error) => execution_error.destroys_worker(),
            Ok(_) => false,
        };

        let delivered = reply.send(result).is_ok();
        if !delivered {
            trace!(worker_id, "view call abandoned before the worker replied");
        }

        if destroy_worker || (!delivered && Instant::now() >= deadline) {
            warn!(worker_id, "destroying view worker after fatal guest condition");
            spawn_worker(Arc::clone(&shared));
            return;
        }
    }
    debug!(worker_id, "view worker stopped");
}

/// Runs one job inside the calling worker thread.
fn execute_job<S>(max_memory: u32, job: Job<S>) -> Result<WorkerOutput, Error>
where
    S: VersionedStore,
{
    let (instance, memory, unresolved_imports) =
        instance_and_memory((*job.module).clone(), max_memory)?;

    // The ABI passes arguments through the bridge, so a callable view
    // method is exactly an exported nullary function without results.
    match instance.export_by_name(&job.method_name) {
        Some(ExternVal::Func(func))
            if func.signature().params().is_empty()
                && func.signature().return_type().is_none() => {}
        _ => return Err(Error::NoSuchMethod(job.method_name)),
    }

    let context = RuntimeContext {
        contract_id: job.contract_id,
        input: job.input,
        block_height: job.block_height,
        deadline: job.deadline,
    };
    let mut runtime = Runtime::new(context, job.snapshot, memory, unresolved_imports);

    match instance.invoke_export(&job.method_name, &[], &mut runtime) {
        Ok(_) => {
            let (result, logs) = runtime.into_output();
            Ok(WorkerOutput {
                result,
                logs,
                block_height: job.block_height,
            })
        }
        Err(invoke_error) => Err(map_invoke_error(invoke_error)),
    }
}

/// Recovers the bridge's structured error from a wasmi trap, or wraps the
/// interpreter's own failure.
fn map_invoke_error(invoke_error: wasmi::Error) -> Error {
    if let Some(host_error) = invoke_error.as_host_error() {
        match host_error.downcast_ref::<Error>() {
            Some(execution_error) => execution_error.clone(),
            None => Error::Interpreter(host_error.to_string()),
        }
    } else {
        Error::Interpreter(invoke_error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        shared::wasm_prep,
        storage::{InMemoryVersionedStore, StateResolver},
    };

    fn prepared_module(wat: &str) -> Arc<Module> {
        let wasm = wabt::wat2wasm(wat).expect("should parse wat");
        Arc::new(wasm_prep::preprocess(64, 64 * 1024, &wasm).expect("should preprocess"))
    }

    fn job(module: Arc<Module>, method_name: &str) -> Job<InMemoryVersionedStore> {
        let store = Arc::new(InMemoryVersionedStore::new());
        let resolver = Arc::new(StateResolver::new(store, Duration::from_millis(500), 1));
        Job {
            module,
            contract_id: "test".to_string(),
            method_name: method_name.to_string(),
            input: Vec::new(),
            block_height: 1,
            snapshot: Snapshot::new(resolver, 1),
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    const OK_MODULE: &str = r#"(module
        (import "env" "value_return" (func $value_return (param i64 i64)))
        (memory 1)
        (data (i32.const 0) "ok")
        (func (export "hello") (call $value_return (i64.const 2) (i64.const 0)))
        (func (export "boom") unreachable))"#;

    #[test]
    fn pool_runs_jobs_and_preserves_fifo_results() {
        let pool = WorkerPool::new(2, 64);
        let module = prepared_module(OK_MODULE);
        for _ in 0..8 {
            let output = pool.execute(job(Arc::clone(&module), "hello")).unwrap();
            assert_eq!(output.result, b"ok");
            assert_eq!(output.block_height, 1);
        }
        assert_eq!(pool.spawned_workers(), 2);
    }

    #[test]
    fn trapping_guest_destroys_and_replaces_the_worker() {
        let pool = WorkerPool::new(1, 64);
        let module = prepared_module(OK_MODULE);

        let trap = pool.execute(job(Arc::clone(&module), "boom")).unwrap_err();
        assert!(matches!(trap, Error::Interpreter(_)), "{trap:?}");

        // The next call succeeds on a fresh worker.
        let output = pool.execute(job(module, "hello")).unwrap();
        assert_eq!(output.result, b"ok");
        assert!(pool.spawned_workers() >= 2);
    }

    #[test]
    fn missing_method_keeps_the_worker() {
        let pool = WorkerPool::new(1, 64);
        let module = prepared_module(OK_MODULE);

        let missing = pool.execute(job(Arc::clone(&module), "nope")).unwrap_err();
        assert!(matches!(missing, Error::NoSuchMethod(_)), "{missing:?}");

        let output = pool.execute(job(module, "hello")).unwrap();
        assert_eq!(output.result, b"ok");
        assert_eq!(pool.spawned_workers(), 1);
    }
}
