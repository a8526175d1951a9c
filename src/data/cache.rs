use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Least-recently-used cache of datasets loaded from files.
#[derive(Debug)]
pub struct DatasetCache<T> {
    capacity: usize,
    entries: Mutex<VecDeque<(PathBuf, Arc<T>)>>,
}

impl<T> DatasetCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached dataset for `path`, loading it on a miss. The loader runs
    /// without the lock held.
    pub fn get_or_load<E>(
        &self,
        path: &Path,
        load: impl FnOnce(&Path) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pos) = entries.iter().position(|(p, _)| p == path) {
                if let Some(entry) = entries.remove(pos) {
                    let value = entry.1.clone();
                    entries.push_front(entry);
                    return Ok(value);
                }
            }
        }

        log::debug!("cache miss: {}", path.display());
        let value = Arc::new(load(path)?);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(p, _)| p != path);
        entries.push_front((path.to_path_buf(), value.clone()));
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.pop_back() {
                log::debug!("cache evict: {}", evicted.display());
            }
        }
        Ok(value)
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn loads_once_and_evicts_least_recent() {
        let cache: DatasetCache<usize> = DatasetCache::new(2);
        let loads = Cell::new(0);
        let load = |p: &Path| -> Result<usize, ()> {
            loads.set(loads.get() + 1);
            Ok(p.as_os_str().len())
        };

        cache.get_or_load(Path::new("a"), load).unwrap();
        cache.get_or_load(Path::new("a"), load).unwrap();
        assert_eq!(loads.get(), 1);

        cache.get_or_load(Path::new("bb"), load).unwrap();
        cache.get_or_load(Path::new("a"), load).unwrap();
        cache.get_or_load(Path::new("ccc"), load).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(loads.get(), 3);

        // "bb" was least recently used.
        cache.get_or_load(Path::new("bb"), load).unwrap();
        assert_eq!(loads.get(), 4);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let cache: DatasetCache<u8> = DatasetCache::new(4);
        assert!(cache.get_or_load(Path::new("x"), |_| Err("boom")).is_err());
        assert!(cache.is_empty());
    }
}
