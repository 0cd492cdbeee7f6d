use std::any::Any;

use thiserror::Error;

/// Everything that can make a single `Coordinator` run fail
/// A failed run never hands back a partial result
#[derive(Debug, Error)]
pub enum MapReduceError {
    /// The map function faulted on the given input
    #[error("map task for input `{input}` failed: {reason}")]
    MapTaskFailed { input: String, reason: String },

    /// The reduce function faulted on the given key
    #[error("reduce task for key `{key}` failed: {reason}")]
    ReduceTaskFailed { key: String, reason: String },

    /// The run was cancelled through its cancellation token
    #[error("map reduce run was cancelled")]
    Cancelled,

    /// The thread for a map task could not be started
    #[error("failed to start map task for input `{input}`: {source}")]
    Spawn {
        input: String,
        #[source]
        source: std::io::Error,
    },

    /// `run_blocking` was called from a thread that already drives a tokio runtime
    #[error("run_blocking cannot be called from within an async runtime, use run instead")]
    NestedRuntime,

    /// The tokio runtime backing `run_blocking` could not be built
    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Turns a panic payload into something printable
/// `panic!` payloads are either `&'static str` or `String`, anything else is opaque
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(_) => "unknown panic payload".to_string(),
    }
}
