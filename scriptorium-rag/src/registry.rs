//! Correlation registry for outstanding compute-worker requests.
//!
//! Every request to the worker registers a one-shot resolver under its
//! correlation ID before the request is sent. The entry leaves the registry
//! exactly once: when the matching response resolves it, when the caller's
//! timeout fires, or when the caller drops its [`PendingResponse`]. All three
//! paths remove under the same lock, so only one of them ever holds the
//! resolver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{RagError, Result};

struct Entry<T> {
    /// Distinguishes this registration from a later one reusing the ID.
    token: u64,
    resolver: oneshot::Sender<T>,
}

struct Slots<T> {
    next_token: u64,
    entries: HashMap<String, Entry<T>>,
}

impl<T> Slots<T> {
    /// Remove `id` only if it still belongs to the registration `token`.
    fn release(&mut self, id: &str, token: u64) -> Option<oneshot::Sender<T>> {
        match self.entries.get(id) {
            Some(entry) if entry.token == token => {
                self.entries.remove(id).map(|entry| entry.resolver)
            }
            _ => None,
        }
    }
}

/// Maps outstanding correlation IDs to their pending resolvers.
///
/// Cloning yields another handle to the same registry.
pub struct CorrelationRegistry<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Clone for CorrelationRegistry<T> {
    fn clone(&self) -> Self {
        Self { slots: Arc::clone(&self.slots) }
    }
}

impl<T> Default for CorrelationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CorrelationRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry").field("pending", &self.len()).finish()
    }
}

fn lock<T>(slots: &Mutex<Slots<T>>) -> MutexGuard<'_, Slots<T>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> CorrelationRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { slots: Arc::new(Mutex::new(Slots { next_token: 0, entries: HashMap::new() })) }
    }

    /// Register a resolver under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChannelError`] if `id` is already pending.
    pub fn register(&self, id: impl Into<String>) -> Result<PendingResponse<T>> {
        let id = id.into();
        let (resolver, receiver) = oneshot::channel();

        let mut slots = lock(&self.slots);
        if slots.entries.contains_key(&id) {
            return Err(RagError::ChannelError(format!("correlation id '{id}' is already pending")));
        }
        slots.next_token += 1;
        let token = slots.next_token;
        slots.entries.insert(id.clone(), Entry { token, resolver });
        drop(slots);

        Ok(PendingResponse { id, token, receiver, slots: Arc::clone(&self.slots) })
    }

    /// Deliver `value` to the caller waiting on `id`.
    ///
    /// Returns `false`, leaving the registry untouched, when nothing is
    /// pending under `id` (an unknown or late response).
    pub fn resolve(&self, id: &str, value: T) -> bool {
        let entry = lock(&self.slots).entries.remove(id);
        match entry {
            Some(entry) => {
                // The receiver may have been dropped between our removal and
                // this send; the entry is gone either way.
                let _ = entry.resolver.send(value);
                true
            }
            None => false,
        }
    }

    /// Drop every pending resolver, waking all waiters with no value.
    pub fn close(&self) {
        let drained = std::mem::take(&mut lock(&self.slots).entries);
        if !drained.is_empty() {
            debug!(count = drained.len(), "released pending requests on close");
        }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        lock(&self.slots).entries.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a request is outstanding under `id`.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.slots).entries.contains_key(id)
    }
}

/// The caller's side of one registered request.
///
/// Dropping it before a response arrives removes the registry entry, so a
/// cancelled caller never leaves a dangling resolver behind.
pub struct PendingResponse<T> {
    id: String,
    token: u64,
    receiver: oneshot::Receiver<T>,
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> PendingResponse<T> {
    /// The correlation ID this response is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the response, giving up after `timeout`.
    ///
    /// Returns `None` on timeout or when the resolver was dropped without a
    /// value. On timeout the entry is removed before returning; if the
    /// response won that race its value is returned instead.
    pub async fn wait(mut self, timeout: Duration) -> Option<T> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => None,
            Err(_) => {
                if lock(&self.slots).release(&self.id, self.token).is_some() {
                    debug!(correlation_id = %self.id, ?timeout, "request timed out");
                    None
                } else {
                    self.receiver.try_recv().ok()
                }
            }
        }
    }
}

impl<T> Drop for PendingResponse<T> {
    fn drop(&mut self) {
        lock(&self.slots).release(&self.id, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_matching_request_once() {
        let registry = CorrelationRegistry::new();
        let pending = registry.register("a").unwrap();

        assert!(registry.resolve("a", 7));
        assert!(!registry.resolve("a", 8));
        assert_eq!(pending.wait(Duration::from_secs(1)).await, Some(7));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let registry = CorrelationRegistry::<u8>::new();
        let _pending = registry.register("dup").unwrap();
        assert!(matches!(registry.register("dup"), Err(RagError::ChannelError(_))));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_entry_and_ignores_late_response() {
        let registry = CorrelationRegistry::<u8>::new();
        let pending = registry.register("slow").unwrap();

        assert_eq!(pending.wait(Duration::from_secs(60)).await, None);
        assert!(!registry.contains("slow"));
        assert!(!registry.resolve("slow", 1));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn dropping_pending_response_unregisters() {
        let registry = CorrelationRegistry::<u8>::new();
        let pending = registry.register("gone").unwrap();
        drop(pending);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stale_handle_does_not_remove_reregistered_id() {
        let registry = CorrelationRegistry::<u8>::new();
        let first = registry.register("reused").unwrap();
        assert!(registry.resolve("reused", 1));
        let second = registry.register("reused").unwrap();

        drop(first);
        assert!(registry.contains("reused"));
        assert!(registry.resolve("reused", 2));
        assert_eq!(second.wait(Duration::from_secs(1)).await, Some(2));
    }

    #[tokio::test]
    async fn close_wakes_waiters_without_value() {
        let registry = CorrelationRegistry::<u8>::new();
        let pending = registry.register("x").unwrap();
        registry.close();
        assert_eq!(pending.wait(Duration::from_secs(60)).await, None);
    }
}
