//! Pool of lazily created, reusable per-worker handles.
//!
//! Tabix readers and SQLite connections carry a cursor and must not be
//! used by two callers at once.  Each caller checks out a handle for the
//! duration of one lookup; the handle goes back to the pool on drop.

use std::{
    ops::{Deref, DerefMut},
    sync::Mutex,
};

type Factory<T> = Box<dyn Fn() -> Result<T, anyhow::Error> + Send + Sync>;

/// A pool of handles of type `T`, created on demand by a factory.
pub struct HandlePool<T> {
    label: String,
    factory: Factory<T>,
    idle: Mutex<Vec<T>>,
}

impl<T> std::fmt::Debug for HandlePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("label", &self.label)
            .finish()
    }
}

impl<T> HandlePool<T> {
    /// Construct a new pool; `label` is used in log messages only.
    pub fn new<F>(label: &str, factory: F) -> Self
    where
        F: Fn() -> Result<T, anyhow::Error> + Send + Sync + 'static,
    {
        Self {
            label: label.to_string(),
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Check out an idle handle or create a new one.
    pub fn checkout(&self) -> Result<PoolGuard<'_, T>, anyhow::Error> {
        let idle = self
            .idle
            .lock()
            .map_err(|e| anyhow::anyhow!("handle pool {} poisoned: {}", &self.label, e))?
            .pop();
        let handle = match idle {
            Some(handle) => handle,
            None => {
                tracing::trace!("creating new handle for {}", &self.label);
                (self.factory)()
                    .map_err(|e| anyhow::anyhow!("could not open {}: {}", &self.label, e))?
            }
        };
        Ok(PoolGuard {
            pool: self,
            handle: Some(handle),
        })
    }

    /// Number of idle handles.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or_default()
    }
}

/// A checked-out handle; returned to the pool on drop.
pub struct PoolGuard<'a, T> {
    pool: &'a HandlePool<T>,
    handle: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // The handle is only taken out in `drop`.
        match self.handle.as_ref() {
            Some(handle) => handle,
            None => unreachable!("handle taken before drop"),
        }
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.handle.as_mut() {
            Some(handle) => handle,
            None => unreachable!("handle taken before drop"),
        }
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push(handle);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use pretty_assertions::assert_eq;
    use rayon::prelude::*;

    use super::HandlePool;

    #[test]
    fn reuses_returned_handles() -> Result<(), anyhow::Error> {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let pool = HandlePool::new("test", move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });

        {
            let first = pool.checkout()?;
            let second = pool.checkout()?;
            assert_eq!((*first, *second), (0, 1));
        }
        assert_eq!(pool.idle_count(), 2);
        {
            let _again = pool.checkout()?;
        }
        assert_eq!(created.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[test]
    fn factory_error_propagates() {
        let pool: HandlePool<u32> = HandlePool::new("broken", || anyhow::bail!("nope"));
        assert!(pool.checkout().is_err());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn concurrent_checkouts_never_share() -> Result<(), anyhow::Error> {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let pool = HandlePool::new("parallel", move || {
            Ok(vec![counter.fetch_add(1, Ordering::SeqCst)])
        });

        (0..64).into_par_iter().try_for_each(|i| {
            let mut handle = pool.checkout()?;
            handle.push(i);
            Ok::<(), anyhow::Error>(())
        })?;

        assert_eq!(pool.idle_count(), created.load(Ordering::SeqCst));

        Ok(())
    }
}
