#![forbid(unsafe_code)]

//! Named property change notification.
//!
//! [`PropertyNotifier`] is embedded in a model object. Setters route through
//! [`PropertyNotifier::set_field`], which only notifies when the stored value
//! actually changes.
//!
//! ```
//! use std::sync::Arc;
//! use wbus_core::InlineContext;
//! use wbus_runtime::PropertyNotifier;
//!
//! struct Person {
//!     name: String,
//!     notifier: PropertyNotifier,
//! }
//!
//! impl Person {
//!     fn set_name(&mut self, name: &str) {
//!         self.notifier.set_field(&mut self.name, name.to_string(), "name");
//!     }
//! }
//!
//! let mut p = Person {
//!     name: String::new(),
//!     notifier: PropertyNotifier::new(Arc::new(InlineContext)),
//! };
//! let _sub = p.notifier.subscribe_owned(|_, change| assert_eq!(&*change.property_name, "name"));
//! p.set_name("Ada");
//! ```

use std::sync::Arc;

use wbus_core::{DeliveryContext, Handler, Subscription, WeakNotificationBus};

use crate::source::SourceId;

/// Names the property that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyChanged {
    pub property_name: Arc<str>,
}

impl PropertyChanged {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            property_name: Arc::from(name),
        }
    }
}

/// Handler for [`PropertyChanged`].
pub type PropertyChangedHandler = Handler<SourceId, PropertyChanged>;

pub struct PropertyNotifier {
    source: SourceId,
    bus: WeakNotificationBus<SourceId, PropertyChanged>,
}

impl std::fmt::Debug for PropertyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyNotifier")
            .field("source", &self.source)
            .field("subscribers", &self.bus.subscriber_count())
            .finish()
    }
}

impl PropertyNotifier {
    #[must_use]
    pub fn new(context: Arc<dyn DeliveryContext>) -> Self {
        Self {
            source: SourceId::next(),
            bus: WeakNotificationBus::new(context),
        }
    }

    /// Sender id passed to subscribers.
    #[must_use]
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn subscribe(&self, handler: &PropertyChangedHandler) {
        self.bus.subscribe(handler);
    }

    pub fn unsubscribe(&self, handler: &PropertyChangedHandler) {
        self.bus.unsubscribe(handler);
    }

    pub fn subscribe_owned(
        &self,
        handler: impl Fn(&SourceId, &PropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe_owned(handler)
    }

    /// Subscribe to changes of a single property.
    ///
    /// The handler only sees notifications whose name equals `name`. It is
    /// held by the returned guard like any other owned subscription.
    pub fn subscribe_property(
        &self,
        name: &str,
        handler: impl Fn(&SourceId, &PropertyChanged) + Send + Sync + 'static,
    ) -> Subscription {
        let name: Arc<str> = Arc::from(name);
        self.bus.subscribe_owned(move |source, change| {
            if change.property_name == name {
                handler(source, change);
            }
        })
    }

    pub fn notify_changed(&self, name: &str) {
        tracing::trace!(source = %self.source, property = name, "property changed");
        self.bus.notify(self.source, PropertyChanged::new(name));
    }

    /// Notify each name in turn.
    pub fn notify_many(&self, names: &[&str]) {
        for name in names {
            self.notify_changed(name);
        }
    }

    /// Store `value` in `field` and notify, unless the value is unchanged.
    ///
    /// Returns whether the field changed.
    pub fn set_field<T: PartialEq>(&self, field: &mut T, value: T, name: &str) -> bool {
        if *field == value {
            return false;
        }
        *field = value;
        self.notify_changed(name);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wbus_core::InlineContext;

    fn recorder(notifier: &PropertyNotifier) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        let sub = notifier.subscribe_owned(move |_, change| {
            sink.lock().unwrap().push(change.property_name.to_string());
        });
        (names, sub)
    }

    #[test]
    fn set_field_notifies_only_on_change() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let (names, _sub) = recorder(&notifier);
        let mut count = 0u32;

        assert!(notifier.set_field(&mut count, 1, "count"));
        assert!(!notifier.set_field(&mut count, 1, "count"));
        assert!(notifier.set_field(&mut count, 2, "count"));

        assert_eq!(count, 2);
        assert_eq!(*names.lock().unwrap(), vec!["count", "count"]);
    }

    #[test]
    fn notify_many_preserves_order() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let (names, _sub) = recorder(&notifier);
        notifier.notify_many(&["first", "last", "full_name"]);
        assert_eq!(*names.lock().unwrap(), vec!["first", "last", "full_name"]);
    }

    #[test]
    fn sender_is_notifier_source() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let handler: PropertyChangedHandler =
            Arc::new(move |src: &SourceId, _: &PropertyChanged| *s.lock().unwrap() = Some(*src));
        notifier.subscribe(&handler);
        notifier.notify_changed("x");
        assert_eq!(*seen.lock().unwrap(), Some(notifier.source()));

        notifier.unsubscribe(&handler);
        *seen.lock().unwrap() = None;
        notifier.notify_changed("x");
        assert_eq!(*seen.lock().unwrap(), None);
    }

    #[test]
    fn property_subscription_filters_by_name() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let _sub = notifier.subscribe_property("title", move |src, change| {
            sink.lock().unwrap().push((*src, change.property_name.to_string()));
        });

        notifier.notify_many(&["body", "title", "titles", "footer", "title"]);
        let source = notifier.source();
        assert_eq!(
            *hits.lock().unwrap(),
            vec![(source, "title".to_string()), (source, "title".to_string())]
        );
    }

    #[test]
    fn dropping_property_subscription_stops_delivery() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let hits = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&hits);
        let sub = notifier.subscribe_property("count", move |_, _| {
            *sink.lock().unwrap() += 1;
        });

        let mut count = 0u32;
        notifier.set_field(&mut count, 1, "count");
        drop(sub);
        notifier.set_field(&mut count, 2, "count");

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(notifier.bus.subscriber_count(), 0);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let notifier = PropertyNotifier::new(Arc::new(InlineContext));
        let (names, sub) = recorder(&notifier);
        notifier.notify_changed("a");
        drop(sub);
        notifier.notify_changed("b");
        assert_eq!(*names.lock().unwrap(), vec!["a"]);
    }
}
