use tracing::debug;

use crate::mr::buffer::IntermediateBuffer;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_parts(self) -> (String, String) {
        (self.key, self.value)
    }
}

/// The user-defined map function: `(input identifier, input contents) -> key-value pairs`
/// It will be called from many threads at once, so it must not touch shared state
pub trait MapFunction: Fn(&str, &str) -> Vec<KeyValue> + Send + Sync + 'static {}

impl<F> MapFunction for F where F: Fn(&str, &str) -> Vec<KeyValue> + Send + Sync + 'static {}

/// The user-defined reduce function: `(key, every value emitted for the key) -> output value`
/// Never called twice for the same key within one run
pub trait ReduceFunction: Fn(&str, &[String]) -> String + Send + Sync + 'static {}

impl<F> ReduceFunction for F where F: Fn(&str, &[String]) -> String + Send + Sync + 'static {}

/// Calls the user-defined map function
pub fn call_map_func<M: MapFunction + ?Sized>(map_func: &M, name: &str, contents: &str) -> Vec<KeyValue> {
    map_func(name, contents)
}

/// Calls the user-defined reduce function
pub fn call_reduce_func<R: ReduceFunction + ?Sized>(reduce_func: &R, key: &str, values: &[String]) -> String {
    reduce_func(key, values)
}

/// One map task, i.e. one entry of the input set
/// Each task is touched by exactly one thread, the only shared thing is the buffer it appends to
#[derive(Debug, Clone)]
pub struct MapTask {
    /// The input identifier, usually a file name
    name: String,
    /// The whole input contents, already in memory
    contents: String,
}

impl MapTask {
    pub fn new(name: String, contents: String) -> Self {
        Self { name, contents }
    }

    /// Run the map function over this input, then hand every pair to the buffer in one locked append
    /// Returns the number of pairs this task emitted
    pub fn run<M: MapFunction + ?Sized>(self, map_func: &M, buffer: &IntermediateBuffer) -> usize {
        let key_value_pairs = call_map_func(map_func, &self.name, &self.contents);
        let emitted = key_value_pairs.len();
        buffer.append(key_value_pairs);
        debug!(input = %self.name, emitted, "[Map] Map task finished");
        emitted
    }
}
