//! Cache of preprocessed modules keyed by contract and code revision.
use std::{collections::HashMap, sync::Arc};

use once_cell::sync::OnceCell;
use parity_wasm::elements::Module;
use parking_lot::RwLock;

type CacheKey = (String, Vec<u8>);
type CacheEntry = Arc<OnceCell<Arc<Module>>>;

/// Maps `(contract id, code revision)` to a preprocessed, reusable module.
///
/// Entries are immutable and retained for the process lifetime; code
/// revisions are content-addressed, so the cache never needs to
/// invalidate, and recompiling after a lost entry is always safe.
#[derive(Default)]
pub(crate) struct ModuleCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ModuleCache {
    /// Returns the cached module for `(contract_id, revision)`, running
    /// `compile` on a miss.
    ///
    /// Concurrent misses for the same key run `compile` at most once (the
    /// rest block on the in-flight compilation); misses for different keys
    /// proceed independently. A failed compilation is not cached.
    pub(crate) fn get_or_compile<E>(
        &self,
        contract_id: &str,
        revision: &[u8],
        compile: impl FnOnce() -> Result<Module, E>,
    ) -> Result<Arc<Module>, E> {
        let key = (contract_id.to_string(), revision.to_vec());
        if let Some(entry) = self.entries.read().get(&key) {
            if let Some(module) = entry.get() {
                return Ok(Arc::clone(module));
            }
        }

        let entry = {
            let mut entries = self.entries.write();
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        match entry.get_or_try_init(|| compile().map(Arc::new)) {
            Ok(module) => Ok(Arc::clone(module)),
            Err(compile_error) => {
                // Drop the placeholder so the next caller may retry, unless
                // a concurrent compilation filled it in the meantime.
                let mut entries = self.entries.write();
                if let Some(existing) = entries.get(&key) {
                    if existing.get().is_none() {
                        entries.remove(&key);
                    }
                }
                Err(compile_error)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Barrier,
    };

    use super::*;

    fn trivial_module() -> Module {
        Module::default()
    }

    #[test]
    fn concurrent_misses_compile_once() {
        let cache = Arc::new(ModuleCache::default());
        let compile_count = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let compile_count = Arc::clone(&compile_count);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_compile::<()>("c", b"rev", || {
                            compile_count.fetch_add(1, Ordering::SeqCst);
                            Ok(trivial_module())
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(compile_count.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_keys_compile_independently() {
        let cache = ModuleCache::default();
        cache
            .get_or_compile::<()>("c", b"r1", || Ok(trivial_module()))
            .unwrap();
        cache
            .get_or_compile::<()>("c", b"r2", || Ok(trivial_module()))
            .unwrap();
        cache
            .get_or_compile::<()>("other", b"r1", || Ok(trivial_module()))
            .unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn failed_compilations_are_not_cached() {
        let cache = ModuleCache::default();
        let failed = cache.get_or_compile("c", b"rev", || Err("bad wasm"));
        assert_eq!(failed.unwrap_err(), "bad wasm");
        assert_eq!(cache.len(), 0);

        // A later attempt with valid output succeeds.
        cache
            .get_or_compile::<()>("c", b"rev", || Ok(trivial_module()))
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn hits_do_not_recompile() {
        let cache = ModuleCache::default();
        let compile_count = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_compile::<()>("c", b"rev", || {
                    compile_count.fetch_add(1, Ordering::SeqCst);
                    Ok(trivial_module())
                })
                .unwrap();
        }
        assert_eq!(compile_count.load(Ordering::SeqCst), 1);
    }
}
