//! Per-key cells for the in-memory adapters.
//!
//! The outer map lock is held only to look up or insert a cell; all
//! mutation happens under the cell's own mutex, so writers for different
//! keys never wait on each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

pub(crate) struct KeyedCells<K, V> {
    cells: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> KeyedCells<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn get(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.cells.read().await.get(key).cloned()
    }

    /// Returns the cell for `key`, creating it with `init` when absent.
    ///
    /// The flag is true when this call created the cell; exactly one of any
    /// number of concurrent callers sees `true`.
    pub(crate) async fn get_or_insert_with<F>(&self, key: K, init: F) -> (Arc<Mutex<V>>, bool)
    where
        F: FnOnce() -> V,
    {
        if let Some(cell) = self.cells.read().await.get(&key) {
            return (Arc::clone(cell), false);
        }

        let mut cells = self.cells.write().await;
        if let Some(cell) = cells.get(&key) {
            return (Arc::clone(cell), false);
        }
        let cell = Arc::new(Mutex::new(init()));
        cells.insert(key, Arc::clone(&cell));
        (cell, true)
    }

    /// All cells, for scans.
    pub(crate) async fn cells(&self) -> Vec<(K, Arc<Mutex<V>>)> {
        self.cells
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub(crate) async fn remove(&self, keys: &[K]) -> usize {
        let mut cells = self.cells.write().await;
        keys.iter().filter(|k| cells.remove(k).is_some()).count()
    }
}
