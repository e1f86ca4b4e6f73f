//! Observable single-value state with replay to late subscribers
//!
//! A `StateCell` holds the latest value and a list of subscriber channels.
//! Every subscriber first receives the current value, then every subsequent
//! transition in order. Closed subscribers are pruned on the next publish.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

struct Inner<T> {
    value: T,
    subscribers: Vec<UnboundedSender<T>>,
}

/// Single-slot broadcast of the latest value
pub struct StateCell<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> StateCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Publish a new value to every live subscriber
    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = value;
        let Inner { value, subscribers } = &mut *inner;
        subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    /// Publish `f(current)` unless it returns `None`
    ///
    /// `f` runs under the cell lock, so no `set` can land between the check
    /// and the publish. Returns whether a value was published.
    pub fn update(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let mut inner = self.inner.lock();
        let Some(next) = f(&inner.value) else {
            return false;
        };
        inner.value = next;
        let Inner { value, subscribers } = &mut *inner;
        subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        true
    }

    /// Subscribe; the receiver immediately yields the current value
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = unbounded_channel();
        let mut inner = self.inner.lock();
        if tx.send(inner.value.clone()).is_ok() {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// Number of subscribers still listening
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl<T: Clone + Send + Default + 'static> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + std::fmt::Debug + 'static> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell").field("value", &self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_subscriber_receives_current_value() {
        let cell = StateCell::new(1);
        cell.set(2);
        let mut rx = cell.subscribe();
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn every_transition_is_delivered_in_order() {
        let cell = StateCell::new("stopped");
        let mut rx = cell.subscribe();
        cell.set("connecting");
        cell.set("started");
        assert_eq!(rx.try_recv().unwrap(), "stopped");
        assert_eq!(rx.try_recv().unwrap(), "connecting");
        assert_eq!(rx.try_recv().unwrap(), "started");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let cell = StateCell::new(0u8);
        let rx = cell.subscribe();
        let _keep = cell.subscribe();
        assert_eq!(cell.subscriber_count(), 2);
        drop(rx);
        cell.set(1);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn update_uses_previous_value() {
        let cell = StateCell::new(10);
        assert!(cell.update(|v| Some(v + 5)));
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn rejected_update_publishes_nothing() {
        let cell = StateCell::new(1);
        let mut rx = cell.subscribe();
        assert_eq!(rx.try_recv().unwrap(), 1);

        assert!(!cell.update(|_| None));
        assert_eq!(cell.get(), 1);
        assert!(rx.try_recv().is_err());
    }
}
