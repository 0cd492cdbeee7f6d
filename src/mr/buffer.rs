use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::mr::worker::KeyValue;

/// The intermediate buffer shared by every map task of one run
/// Writers only append, and nobody reads it until the map phase barrier has passed
#[derive(Debug, Clone, Default)]
pub struct IntermediateBuffer {
    pairs: Arc<Mutex<Vec<KeyValue>>>,
}

impl IntermediateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking map function never holds this lock, so a poisoned buffer still has consistent contents
    fn lock(&self) -> MutexGuard<'_, Vec<KeyValue>> {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append all pairs of one map task under a single lock acquisition
    pub fn append(&self, mut key_value_pairs: Vec<KeyValue>) {
        if key_value_pairs.is_empty() {
            return;
        }
        self.lock().append(&mut key_value_pairs);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take the collected pairs out, only meant to be called after every map task has finished
    pub fn into_inner(self) -> Vec<KeyValue> {
        match Arc::try_unwrap(self.pairs) {
            Ok(pairs) => pairs.into_inner().unwrap_or_else(PoisonError::into_inner),
            // Some handle is still around (e.g. an aborted task that was never polled), drain it instead
            Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner)),
        }
    }
}
