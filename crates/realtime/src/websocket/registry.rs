//! Listener registry and event fan-out
//!
//! Named listeners and wildcard listeners live in separate tables, so an event
//! that is literally called `*` is just another name.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use time::OffsetDateTime;

use super::events::Envelope;
use crate::error::RealtimeError;

/// Callback for a named event, invoked with the raw payload
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback for every event, invoked with the normalized envelope
pub type WildcardListener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Wrap a closure as a named-event listener
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a wildcard listener
pub fn wildcard_listener<F>(f: F) -> WildcardListener
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Listener handles compare by allocation, not by vtable
fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Outcome of one dispatch, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub named: usize,
    pub wildcard: usize,
    pub faults: usize,
}

#[derive(Default)]
struct Listeners {
    named: HashMap<String, Vec<Listener>>,
    wildcard: Vec<WildcardListener>,
}

/// Event name → ordered callbacks, plus the ordered wildcard callbacks
#[derive(Default)]
pub struct ListenerRegistry {
    inner: RwLock<Listeners>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`; duplicates are kept
    pub fn on(&self, event: &str, listener: Listener) {
        tracing::debug!(event = %event, "Registering listener");
        self.inner
            .write()
            .named
            .entry(event.to_string())
            .or_default()
            .push(listener);
    }

    /// Register a listener for every event
    pub fn on_any(&self, listener: WildcardListener) {
        tracing::debug!("Registering wildcard listener");
        self.inner.write().wildcard.push(listener);
    }

    /// Remove the first registration of `listener` for `event`, or all of
    /// `event`'s listeners when `listener` is `None`. Returns how many went.
    pub fn off(&self, event: &str, listener: Option<&Listener>) -> usize {
        let mut inner = self.inner.write();
        let removed = match listener {
            Some(target) => {
                let Some(list) = inner.named.get_mut(event) else {
                    return 0;
                };
                match list.iter().position(|l| same_listener(l, target)) {
                    Some(idx) => {
                        list.remove(idx);
                        1
                    }
                    None => 0,
                }
            }
            None => inner.named.remove(event).map(|list| list.len()).unwrap_or(0),
        };

        if inner.named.get(event).is_some_and(Vec::is_empty) {
            inner.named.remove(event);
        }
        removed
    }

    /// Wildcard counterpart of [`ListenerRegistry::off`]
    pub fn off_any(&self, listener: Option<&WildcardListener>) -> usize {
        let mut inner = self.inner.write();
        match listener {
            Some(target) => match inner.wildcard.iter().position(|l| same_listener(l, target)) {
                Some(idx) => {
                    inner.wildcard.remove(idx);
                    1
                }
                None => 0,
            },
            None => std::mem::take(&mut inner.wildcard).len(),
        }
    }

    /// Drop every listener
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.named.clear();
        inner.wildcard.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.read().named.get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn wildcard_count(&self) -> usize {
        self.inner.read().wildcard.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.named.is_empty() && inner.wildcard.is_empty()
    }

    /// Deliver one inbound event
    ///
    /// Named listeners get the raw payload first, then wildcard listeners get
    /// an envelope. The lock is released before any callback runs, and a
    /// panicking callback is logged and skipped.
    pub fn dispatch(&self, event: &str, payload: &Value) -> DispatchReport {
        let (named, wildcard) = {
            let inner = self.inner.read();
            (
                inner.named.get(event).cloned().unwrap_or_default(),
                inner.wildcard.clone(),
            )
        };

        let mut report = DispatchReport::default();

        for listener in &named {
            if invoke_guarded(event, || listener(payload)) {
                report.named += 1;
            } else {
                report.faults += 1;
            }
        }

        if !wildcard.is_empty() {
            let envelope = Envelope::new(event, payload.clone(), OffsetDateTime::now_utc());
            for listener in &wildcard {
                if invoke_guarded(event, || listener(&envelope)) {
                    report.wildcard += 1;
                } else {
                    report.faults += 1;
                }
            }
        }

        report
    }
}

/// Run one callback, containing a panic. Returns false if it panicked.
fn invoke_guarded(event: &str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let fault = RealtimeError::ListenerFault {
                event: event.to_string(),
                message,
            };
            tracing::error!(event = %event, error = %fault, "Listener fault during dispatch");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, Listener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, listener(move |payload| sink.lock().push(payload.clone())))
    }

    #[test]
    fn test_named_and_wildcard_dispatch() {
        let registry = ListenerRegistry::new();
        let (seen, l) = recorder();
        let envelopes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&envelopes);

        registry.on("status_changed", l);
        registry.on_any(wildcard_listener(move |e| sink.lock().push(e.clone())));

        let payload = json!({"eventId": "e1", "sequence": 7});
        let report = registry.dispatch("status_changed", &payload);

        assert_eq!(report, DispatchReport { named: 1, wildcard: 1, faults: 0 });
        assert_eq!(*seen.lock(), vec![payload.clone()]);

        let envelopes = envelopes.lock();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].event_type, "status_changed");
        assert_eq!(envelopes[0].data, payload);
    }

    #[test]
    fn test_other_names_are_not_delivered() {
        let registry = ListenerRegistry::new();
        let (seen, l) = recorder();
        registry.on("status_changed", l);

        let report = registry.dispatch("location_updated", &json!({}));
        assert_eq!(report.named, 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_duplicate_registration_delivers_twice() {
        let registry = ListenerRegistry::new();
        let (seen, l) = recorder();
        registry.on("e", Arc::clone(&l));
        registry.on("e", Arc::clone(&l));
        assert_eq!(registry.listener_count("e"), 2);

        registry.dispatch("e", &json!(1));
        assert_eq!(seen.lock().len(), 2);

        // off removes one registration at a time
        assert_eq!(registry.off("e", Some(&l)), 1);
        assert_eq!(registry.listener_count("e"), 1);
    }

    #[test]
    fn test_off_specific_and_all() {
        let registry = ListenerRegistry::new();
        let (seen_a, a) = recorder();
        let (seen_b, b) = recorder();
        registry.on("e", Arc::clone(&a));
        registry.on("e", Arc::clone(&b));

        assert_eq!(registry.off("e", Some(&a)), 1);
        registry.dispatch("e", &json!("x"));
        assert!(seen_a.lock().is_empty());
        assert_eq!(seen_b.lock().len(), 1);

        registry.on("e", a);
        assert_eq!(registry.off("e", None), 2);
        assert_eq!(registry.listener_count("e"), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_off_without_match_is_noop() {
        let registry = ListenerRegistry::new();
        let (_, a) = recorder();
        let (_, b) = recorder();
        registry.on("e", a);

        assert_eq!(registry.off("e", Some(&b)), 0);
        assert_eq!(registry.off("missing", None), 0);
        assert_eq!(registry.off_any(None), 0);
        assert_eq!(registry.listener_count("e"), 1);
    }

    #[test]
    fn test_literal_star_is_not_wildcard() {
        let registry = ListenerRegistry::new();
        let (star_seen, star) = recorder();
        registry.on("*", star);

        registry.dispatch("status_changed", &json!({}));
        assert!(star_seen.lock().is_empty());
        assert_eq!(registry.wildcard_count(), 0);

        registry.dispatch("*", &json!("literal"));
        assert_eq!(*star_seen.lock(), vec![json!("literal")]);
    }

    #[test]
    fn test_order_follows_registration() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.on("e", listener(move |_| order.lock().push(tag)));
        }
        registry.dispatch("e", &Value::Null);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::new();
        let (seen, good) = recorder();
        let wildcard_hits = Arc::new(Mutex::new(0));
        let hits = Arc::clone(&wildcard_hits);

        registry.on("e", listener(|_| panic!("listener exploded")));
        registry.on("e", good);
        registry.on_any(wildcard_listener(|_| panic!("wildcard exploded")));
        registry.on_any(wildcard_listener(move |_| *hits.lock() += 1));

        let report = registry.dispatch("e", &json!(1));
        assert_eq!(report, DispatchReport { named: 1, wildcard: 1, faults: 2 });
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(*wildcard_hits.lock(), 1);
    }

    #[test]
    fn test_listener_may_reenter_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = Arc::clone(&registry);
        registry.on(
            "e",
            listener(move |_| {
                inner.off("e", None);
            }),
        );

        registry.dispatch("e", &Value::Null);
        assert_eq!(registry.listener_count("e"), 0);
    }

    #[test]
    fn test_clear() {
        let registry = ListenerRegistry::new();
        let (_, l) = recorder();
        registry.on("a", l);
        registry.on_any(wildcard_listener(|_| {}));
        assert!(!registry.is_empty());

        registry.clear();
        assert!(registry.is_empty());
    }
}
