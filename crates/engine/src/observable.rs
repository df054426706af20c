use std::fmt::{Debug, Formatter};

/// Handle returned by [`Observable::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Box<dyn FnMut(&T) + Send>;

/// State container with explicit change subscription.
///
/// Subscribers run synchronously, first on registration with the current
/// value and then after every `set`/`update`.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use engine::observable::Observable;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let mut counter = Observable::new(0);
/// counter.subscribe(move |value: &i32| sink.lock().unwrap().push(*value));
/// counter.set(3);
/// counter.update(|value| *value += 1);
///
/// assert_eq!(*seen.lock().unwrap(), vec![0, 3, 4]);
/// ```
pub struct Observable<T> {
    value: T,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    next_id: u64,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.notify();
    }

    /// Mutates the value in place and notifies subscribers.
    pub fn update<R>(&mut self, apply: impl FnOnce(&mut T) -> R) -> R {
        let out = apply(&mut self.value);
        self.notify();
        out
    }

    pub fn subscribe(&mut self, mut subscriber: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        subscriber(&self.value);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    fn notify(&mut self) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&self.value);
        }
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug> Debug for Observable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
