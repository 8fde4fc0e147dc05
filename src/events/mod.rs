mod channel;

pub use channel::{Channel, EventEmitter, EventObserver, SubscriptionId, Unsubscriber};

/// Folds a stream of events into some state, e.g. a renderer's view.
pub trait EventHandler<T> {
    fn handle_event(&mut self, event: &T);

    fn handle_events<'a>(&mut self, events: impl IntoIterator<Item = &'a T>)
    where
        T: 'a,
        Self: Sized,
    {
        for event in events {
            self.handle_event(event);
        }
    }
}
