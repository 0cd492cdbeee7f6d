use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use rayon::prelude::*;
use tokio::{sync::oneshot, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mr::{
    buffer::IntermediateBuffer,
    config::{CoordinatorConfig, ReduceStrategy},
    error::{panic_message, MapReduceError},
    worker::{call_reduce_func, KeyValue, MapFunction, MapTask, ReduceFunction},
};

/// Input identifier -> input contents
pub type InputSet = HashMap<String, String>;
/// Key -> every value emitted for the key, in buffer order
pub type GroupedMap = HashMap<String, Vec<String>>;
/// Key -> reduced value
pub type ResultMap = HashMap<String, String>;

/// Counters collected during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// The number of map tasks spawned, one per input
    pub map_tasks: usize,
    /// The number of pairs returned by all map invocations combined
    pub pairs_emitted: usize,
    /// The number of pairs found in the intermediate buffer after the barrier
    pub pairs_buffered: usize,
    /// The number of distinct keys, which is also the number of reduce invocations
    pub distinct_keys: usize,
}

/// Drives one in-memory map -> group -> reduce pass over a fixed input set
pub struct Coordinator<M, R> {
    /// The input set, read-only once the run begins
    inputs: InputSet,
    /// Shared by every map task
    map_func: Arc<M>,
    reduce_func: Arc<R>,
    config: CoordinatorConfig,
}

impl<M: MapFunction, R: ReduceFunction> Coordinator<M, R> {
    /// Create a new coordinator with the default configuration
    pub fn new(inputs: InputSet, map_func: M, reduce_func: R) -> Self {
        Self::with_config(inputs, map_func, reduce_func, CoordinatorConfig::default())
    }

    pub fn with_config(inputs: InputSet, map_func: M, reduce_func: R, config: CoordinatorConfig) -> Self {
        Self {
            inputs,
            map_func: Arc::new(map_func),
            reduce_func: Arc::new(reduce_func),
            config,
        }
    }

    /// Run the whole pipeline and return the result map
    pub async fn run(self) -> Result<ResultMap, MapReduceError> {
        self.run_with_stats().await.map(|(result, _)| result)
    }

    /// Same as `run`, but blocks the calling thread on a runtime of its own
    /// Fails with `NestedRuntime` when called from inside an async context
    pub fn run_blocking(self) -> Result<ResultMap, MapReduceError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(MapReduceError::NestedRuntime);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        runtime.block_on(self.run())
    }

    /// Run the whole pipeline, also reporting how many pairs went through each stage
    pub async fn run_with_stats(self) -> Result<(ResultMap, RunStats), MapReduceError> {
        let Self { inputs, map_func, reduce_func, config } = self;
        let CoordinatorConfig { reduce_strategy, cancellation } = config;

        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            warn!("[Map] Cancelled before the map phase began, no map task will be spawned");
            return Err(MapReduceError::Cancelled);
        }

        let map_tasks = inputs.len();
        info!(map_tasks, "[Map] Map phase begins");

        let buffer = IntermediateBuffer::new();
        let pairs_emitted = map_phase(inputs, map_func, &buffer, cancellation.as_ref()).await?;

        // Every map task has finished, nobody else writes to the buffer from here on
        let intermediate = buffer.into_inner();
        let pairs_buffered = intermediate.len();
        info!(pairs_emitted, pairs_buffered, "[Map] All map tasks have finished");

        // Grouping and reducing are plain CPU work, keep them off the async workers
        let handle = tokio::task::spawn_blocking(move || {
            let grouped = group_by_key(intermediate);
            info!(distinct_keys = grouped.len(), ?reduce_strategy, "[Reduce] Reduce phase begins");
            reduce_phase(grouped, reduce_func.as_ref(), reduce_strategy)
        });
        let result = match handle.await {
            Ok(reduced) => reduced?,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(_) => return Err(MapReduceError::Cancelled),
        };
        info!(keys = result.len(), "[Reduce] All reduce tasks have finished");

        let stats = RunStats {
            map_tasks,
            pairs_emitted,
            pairs_buffered,
            distinct_keys: result.len(),
        };
        Ok((result, stats))
    }
}

/// Start one dedicated thread per input, no pool sits in between, and wait for every one of them
/// Whatever the outcome, every map thread has been joined once this returns
async fn map_phase<M: MapFunction>(
    inputs: InputSet,
    map_func: Arc<M>,
    buffer: &IntermediateBuffer,
    cancellation: Option<&CancellationToken>,
) -> Result<usize, MapReduceError> {
    let mut threads = Vec::with_capacity(inputs.len());
    let mut pending = JoinSet::new();

    for (name, contents) in inputs {
        let (done_tx, done_rx) = oneshot::channel();
        let task = MapTask::new(name.clone(), contents);
        let map_func = Arc::clone(&map_func);
        let buffer = buffer.clone();
        let input = name.clone();
        debug!(input = %name, "[Map] Spawning map task");

        let spawned = thread::Builder::new().name("mr-map".to_string()).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(map_func.as_ref(), &buffer)))
                .map_err(|payload| MapReduceError::MapTaskFailed {
                    input,
                    reason: panic_message(payload),
                });
            // Nobody listens anymore if the run was already aborted
            let _ = done_tx.send(outcome);
        });
        match spawned {
            Ok(handle) => threads.push(handle),
            Err(source) => {
                error!(input = %name, error = %source, "[Map] Failed to start map task, aborting the run");
                pending.shutdown().await;
                join_map_threads(threads).await;
                return Err(MapReduceError::Spawn { input: name, source });
            }
        }
        // A dropped sender means the thread never reported, which only happens on shutdown
        pending.spawn(async move { done_rx.await.unwrap_or(Err(MapReduceError::Cancelled)) });
    }

    let outcome = wait_for_map_tasks(&mut pending, cancellation).await;
    pending.shutdown().await;
    join_map_threads(threads).await;
    outcome
}

/// The barrier: drain every map task result, bailing out on the first failure or on cancellation
async fn wait_for_map_tasks(
    pending: &mut JoinSet<Result<usize, MapReduceError>>,
    cancellation: Option<&CancellationToken>,
) -> Result<usize, MapReduceError> {
    let mut pairs_emitted = 0;
    loop {
        let joined = match cancellation {
            Some(token) => tokio::select! {
                joined = pending.join_next() => joined,
                _ = token.cancelled() => {
                    warn!(outstanding = pending.len(), "[Map] Cancellation requested, aborting the run");
                    return Err(MapReduceError::Cancelled);
                }
            },
            None => pending.join_next().await,
        };

        // The set is drained, every map task has reported
        let Some(joined) = joined else {
            break;
        };

        match joined {
            Ok(Ok(emitted)) => pairs_emitted += emitted,
            Ok(Err(e)) => {
                error!(error = %e, outstanding = pending.len(), "[Map] Map task faulted, aborting the run");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "[Map] Map task was cancelled by the runtime, aborting the run");
                return Err(MapReduceError::Cancelled);
            }
        }
    }
    Ok(pairs_emitted)
}

/// Map threads cannot be interrupted, so wait for the stragglers off the async workers
async fn join_map_threads(threads: Vec<thread::JoinHandle<()>>) {
    if threads.is_empty() {
        return;
    }
    let joined = tokio::task::spawn_blocking(move || {
        for handle in threads {
            // Panics are caught inside the thread, a join error cannot carry anything new
            let _ = handle.join();
        }
    })
    .await;
    if let Err(e) = joined {
        warn!(error = %e, "[Map] Could not wait for every map thread");
    }
}

/// Collect the values of every key, creating the sequence on first sight of a key
pub fn group_by_key(intermediate: Vec<KeyValue>) -> GroupedMap {
    let mut grouped = GroupedMap::new();
    for kv in intermediate {
        let (key, value) = kv.into_parts();
        grouped.entry(key).or_default().push(value);
    }
    grouped
}

/// Invoke the reduce function exactly once per key
pub fn reduce_phase<R: ReduceFunction + ?Sized>(
    grouped: GroupedMap,
    reduce_func: &R,
    strategy: ReduceStrategy,
) -> Result<ResultMap, MapReduceError> {
    match strategy {
        ReduceStrategy::Sequential => grouped
            .into_iter()
            .map(|(key, values)| reduce_one(reduce_func, key, values))
            .collect(),
        ReduceStrategy::Parallel => grouped
            .into_par_iter()
            .map(|(key, values)| reduce_one(reduce_func, key, values))
            .collect(),
    }
}

fn reduce_one<R: ReduceFunction + ?Sized>(
    reduce_func: &R,
    key: String,
    values: Vec<String>,
) -> Result<(String, String), MapReduceError> {
    match panic::catch_unwind(AssertUnwindSafe(|| call_reduce_func(reduce_func, &key, &values))) {
        Ok(reduced) => Ok((key, reduced)),
        Err(payload) => {
            let reason = panic_message(payload);
            error!(%key, %reason, "[Reduce] Reduce task faulted, aborting the run");
            Err(MapReduceError::ReduceTaskFailed { key, reason })
        }
    }
}
