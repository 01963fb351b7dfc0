//! Candidates that survived confirmation, shared by every worker.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only set of confirmed candidates. Clones share the same storage;
/// entries appear in completion order, which is not the candidate order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ResultSet {
    pub fn push(&self, candidate: String) {
        self.lock().push(candidate);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.lock().iter().any(|c| c == candidate)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn into_vec(self) -> Vec<String> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panicking writer cannot leave a half-pushed entry behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
