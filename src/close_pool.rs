use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A handle that can be closed out-of-band to interrupt a pending operation.
pub trait Closer: Send + Sync {
    fn close(&self);
}

impl Closer for CancellationToken {
    fn close(&self) {
        self.cancel();
    }
}

/// A set of closable handles that are closed as a group.
///
/// A query registers the receive side of each socket it opens here, so that
/// when its deadline fires every pending read is unblocked without a watcher
/// task per socket. Closing is one-shot: handles added after `close()` are
/// closed immediately.
#[derive(Default)]
pub struct ClosePool {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    closed: bool,
    next_id: u64,
    handles: HashMap<u64, Arc<dyn Closer>>,
}

impl ClosePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. If the pool is already closed, the handle is
    /// closed before returning.
    pub fn add(&self, handle: Arc<dyn Closer>) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if inner.closed {
            drop(inner);
            handle.close();
            return id;
        }
        inner.handles.insert(id, handle);
        id
    }

    /// Deregister a handle. No-op on a closed pool or an unknown id.
    pub fn remove(&self, id: u64) {
        self.inner.lock().handles.remove(&id);
    }

    /// Close every registered handle exactly once and mark the pool closed.
    pub fn close(&self) {
        let handles = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            std::mem::take(&mut inner.handles)
        };
        for handle in handles.into_values() {
            handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCloser(AtomicUsize);

    impl Closer for CountingCloser {
        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn close_closes_registered_handles_once() {
        let pool = ClosePool::new();
        let handle = Arc::new(CountingCloser(AtomicUsize::new(0)));
        pool.add(handle.clone());
        pool.close();
        pool.close();
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_after_close_closes_immediately() {
        let pool = ClosePool::new();
        pool.close();
        let handle = Arc::new(CountingCloser(AtomicUsize::new(0)));
        pool.add(handle.clone());
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_handles_are_not_closed() {
        let pool = ClosePool::new();
        let handle = Arc::new(CountingCloser(AtomicUsize::new(0)));
        let id = pool.add(handle.clone());
        pool.remove(id);
        pool.close();
        assert_eq!(handle.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_on_closed_pool_is_noop() {
        let pool = ClosePool::new();
        let handle = Arc::new(CountingCloser(AtomicUsize::new(0)));
        let id = pool.add(handle.clone());
        pool.close();
        pool.remove(id);
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
    }
}
