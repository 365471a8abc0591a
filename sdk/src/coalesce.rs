use {
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    parking_lot::Mutex,
    std::{collections::HashMap, future::Future, hash::Hash, sync::Arc},
};

type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Collapses concurrent lookups of the same key into one request.
///
/// The first caller for a key starts the producer; callers arriving before it settles
/// await the same future. The entry is removed once the future settles, successfully or
/// not, so a later call starts a fresh request. If every caller drops the future before
/// that, the entry stays and the next caller for the key resumes it.
pub struct RequestCoalescer<K, T, E> {
    in_flight: Arc<Mutex<HashMap<K, InFlight<T, E>>>>,
}

impl<K, T, E> Default for RequestCoalescer<K, T, E> {
    #[inline]
    fn default() -> Self {
        Self {
            in_flight: Arc::default(),
        }
    }
}

impl<K, T, E> RequestCoalescer<K, T, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending request for `key`, or registers the one made by `producer`.
    ///
    /// `producer` is only called when no request for `key` is pending.
    #[inline]
    pub fn get_or_create<F, Fut>(&self, key: K, producer: F) -> InFlight<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(pending) = in_flight.get(&key) {
            return pending.clone();
        }
        let registry = Arc::clone(&self.in_flight);
        let request = producer();
        let entry_key = key.clone();
        let pending = async move {
            let result = request.await;
            registry.lock().remove(&entry_key);
            result
        }
        .boxed()
        .shared();
        in_flight.insert(key, pending.clone());
        pending
    }

    /// Number of requests currently pending.
    #[must_use]
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}
