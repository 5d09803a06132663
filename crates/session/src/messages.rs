use crate::clock::Clock;
use crate::timer::TimerHandle;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// Maximum number of notices held at once; the oldest is dropped first.
pub const QUEUE_LENGTH: usize = 5;
/// How long the whole set stays visible after the latest insert.
pub const MESSAGE_ON_SCREEN_MS: u64 = 2200;

// Keeps the expiry check from landing exactly on the deadline.
const EXPIRY_SLACK: Duration = Duration::from_millis(1);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Named(String),
    Unique(u64),
}

impl MessageKey {
    pub fn named(key: impl Into<String>) -> Self {
        MessageKey::Named(key.into())
    }

    /// A token never handed out before in this process.
    pub fn unique() -> Self {
        MessageKey::Unique(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub key: MessageKey,
    pub text: String,
}

/// Told when the visible set of notices changes.
pub trait MessageListener: Send + Sync {
    fn messages_changed(&self, visible: &[String]);
    fn messages_cleared(&self);
}

/// Short-lived operator notices sharing a single visibility deadline.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    state: Mutex<BusState>,
    listener: Arc<dyn MessageListener>,
    clock: Arc<dyn Clock>,
    on_screen: Duration,
}

#[derive(Default)]
struct BusState {
    entries: VecDeque<PendingMessage>,
    last_arrival: Option<Instant>,
    expiry: Option<TimerHandle>,
}

impl BusState {
    fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|m| m.text.clone()).collect()
    }

    fn remove(&mut self, key: &MessageKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| &m.key != key);
        self.entries.len() != before
    }
}

impl MessageBus {
    pub fn new(listener: Arc<dyn MessageListener>, clock: Arc<dyn Clock>) -> Self {
        Self::with_on_screen(listener, clock, Duration::from_millis(MESSAGE_ON_SCREEN_MS))
    }

    pub fn with_on_screen(
        listener: Arc<dyn MessageListener>,
        clock: Arc<dyn Clock>,
        on_screen: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                listener,
                clock,
                on_screen,
            }),
        }
    }

    /// Insert under a freshly generated key.
    pub fn add_unique(&self, text: impl Into<String>) {
        self.insert(MessageKey::unique(), text.into(), None);
    }

    /// Insert under `key`, replacing and moving to the end any earlier entry.
    pub fn upsert(&self, key: &str, text: impl Into<String>) {
        self.insert(MessageKey::named(key), text.into(), None);
    }

    /// Drop the entry for `key` and add `text` as a new unique entry.
    ///
    /// Used when a progress notice is superseded by its outcome, so a later
    /// progress notice under the same key does not overwrite the outcome.
    pub fn replace(&self, key: &str, text: impl Into<String>) {
        let stale = MessageKey::named(key);
        self.insert(MessageKey::unique(), text.into(), Some(&stale));
    }

    /// Remove the entry for `key`. Returns whether one was held.
    pub fn remove(&self, key: &str) -> bool {
        let visible = {
            let mut state = self.inner.lock();
            if !state.remove(&MessageKey::named(key)) {
                return false;
            }
            state.texts()
        };
        self.inner.listener.messages_changed(&visible);
        true
    }

    /// Held texts, oldest-first, or `None` once the shared deadline passed.
    pub fn currently_visible(&self) -> Option<Vec<String>> {
        let now = self.inner.clock.now();
        let state = self.inner.lock();
        if !self.inner.is_visible(&state, now) {
            return None;
        }
        Some(state.texts())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the pending expiry check.
    pub fn dispose(&self) {
        if let Some(timer) = self.inner.lock().expiry.take() {
            timer.cancel();
        }
    }

    fn insert(&self, key: MessageKey, text: String, stale: Option<&MessageKey>) {
        let visible = {
            let mut state = self.inner.lock();
            if let Some(stale) = stale {
                state.remove(stale);
            }
            state.remove(&key);
            state.entries.push_back(PendingMessage { key, text });
            while state.entries.len() > QUEUE_LENGTH {
                state.entries.pop_front();
            }
            state.last_arrival = Some(self.inner.clock.now());

            // Replacing the handle cancels the previous check.
            let weak = Arc::downgrade(&self.inner);
            state.expiry = Some(TimerHandle::once(
                "osd-expiry",
                self.inner.on_screen + EXPIRY_SLACK,
                move || BusInner::expire(&weak),
            ));
            state.texts()
        };
        self.inner.listener.messages_changed(&visible);
    }
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_visible(&self, state: &BusState, now: Instant) -> bool {
        match state.last_arrival {
            Some(last) => now <= last + self.on_screen && !state.entries.is_empty(),
            None => false,
        }
    }

    fn expire(weak: &Weak<BusInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let now = inner.clock.now();
        {
            let mut state = inner.lock();
            if inner.is_visible(&state, now) || state.entries.is_empty() {
                return;
            }
            state.entries.clear();
            state.expiry = None;
        }
        inner.listener.messages_cleared();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;

    #[derive(Debug, PartialEq)]
    enum Event {
        Changed(Vec<String>),
        Cleared,
    }

    struct ChannelListener(Mutex<Sender<Event>>);

    impl MessageListener for ChannelListener {
        fn messages_changed(&self, visible: &[String]) {
            self.0.lock().unwrap().send(Event::Changed(visible.to_vec())).ok();
        }

        fn messages_cleared(&self) {
            self.0.lock().unwrap().send(Event::Cleared).ok();
        }
    }

    fn manual_bus() -> (MessageBus, Arc<ManualClock>, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let clock = Arc::new(ManualClock::new());
        let bus = MessageBus::new(Arc::new(ChannelListener(Mutex::new(tx))), clock.clone());
        (bus, clock, rx)
    }

    fn fast_bus(on_screen: Duration) -> (MessageBus, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let bus = MessageBus::with_on_screen(
            Arc::new(ChannelListener(Mutex::new(tx))),
            Arc::new(SystemClock),
            on_screen,
        );
        (bus, rx)
    }

    #[test]
    fn upsert_keeps_one_entry_and_moves_it_last() {
        let (bus, _clock, _rx) = manual_bus();
        bus.upsert("focus", "A");
        bus.add_unique("other");
        bus.upsert("focus", "B");

        assert_eq!(
            bus.currently_visible(),
            Some(vec!["other".to_string(), "B".to_string()])
        );
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn sixth_message_evicts_the_oldest() {
        let (bus, _clock, _rx) = manual_bus();
        for i in 1..=6 {
            bus.add_unique(format!("m{}", i));
        }
        let visible = bus.currently_visible().unwrap();
        assert_eq!(visible, vec!["m2", "m3", "m4", "m5", "m6"]);
    }

    #[test]
    fn full_bus_never_drops_newest_upsert() {
        let (bus, _clock, _rx) = manual_bus();
        for i in 0..QUEUE_LENGTH {
            bus.add_unique(format!("m{}", i));
        }
        bus.upsert("capture", "Capturing...");
        let visible = bus.currently_visible().unwrap();
        assert_eq!(visible.len(), QUEUE_LENGTH);
        assert_eq!(visible.last().unwrap(), "Capturing...");
    }

    #[test]
    fn replace_swaps_progress_for_outcome() {
        let (bus, _clock, _rx) = manual_bus();
        bus.upsert("capture", "Capturing...");
        bus.add_unique("New batch: batch-01");
        bus.replace("capture", "Frame saved to: batch-01/img-0000.jpg");

        assert_eq!(
            bus.currently_visible().unwrap(),
            vec!["New batch: batch-01", "Frame saved to: batch-01/img-0000.jpg"]
        );

        // A new progress notice does not clobber the outcome.
        bus.upsert("capture", "Capturing...");
        assert_eq!(bus.len(), 3);
    }

    #[test]
    fn visibility_follows_latest_insert() {
        let (bus, clock, _rx) = manual_bus();
        assert_eq!(bus.currently_visible(), None);

        bus.add_unique("first");
        clock.advance(Duration::from_millis(2000));
        bus.add_unique("second");
        clock.advance(Duration::from_millis(2000));
        // 4000ms after "first" but only 2000ms after "second": all still shown.
        assert_eq!(bus.currently_visible().unwrap().len(), 2);

        clock.advance(Duration::from_millis(MESSAGE_ON_SCREEN_MS - 2000));
        assert!(bus.currently_visible().is_some(), "deadline itself is inclusive");

        clock.advance(Duration::from_millis(1));
        assert_eq!(bus.currently_visible(), None);
    }

    #[test]
    fn remove_notifies_and_forgets() {
        let (bus, _clock, rx) = manual_bus();
        bus.upsert("focus", "Focus set to: 3");
        assert_eq!(rx.recv().unwrap(), Event::Changed(vec!["Focus set to: 3".into()]));

        assert!(bus.remove("focus"));
        assert_eq!(rx.recv().unwrap(), Event::Changed(vec![]));
        assert!(!bus.remove("focus"));
        assert_eq!(bus.currently_visible(), None);
    }

    #[test]
    fn every_insert_notifies_listener() {
        let (bus, _clock, rx) = manual_bus();
        bus.add_unique("a");
        bus.upsert("k", "b");
        assert_eq!(rx.recv().unwrap(), Event::Changed(vec!["a".into()]));
        assert_eq!(rx.recv().unwrap(), Event::Changed(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn expiry_clears_after_window() {
        let (bus, rx) = fast_bus(Duration::from_millis(30));
        bus.add_unique("hello");
        assert!(matches!(rx.recv().unwrap(), Event::Changed(_)));

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Event::Cleared);
        assert_eq!(bus.currently_visible(), None);
        assert!(bus.is_empty());
    }

    #[test]
    fn burst_reschedules_single_expiry() {
        let (bus, rx) = fast_bus(Duration::from_millis(60));
        let started = Instant::now();
        let mut last_insert = started;
        for i in 0..4 {
            last_insert = Instant::now();
            bus.add_unique(format!("m{}", i));
            thread::sleep(Duration::from_millis(30));
        }

        let mut cleared = 0;
        while let Ok(event) = rx.recv_timeout(Duration::from_millis(300)) {
            if event == Event::Cleared {
                cleared += 1;
                assert!(Instant::now() >= last_insert + Duration::from_millis(60));
            }
        }
        assert_eq!(cleared, 1, "stale checks must not fire");
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn unique_keys_are_distinct() {
        assert_ne!(MessageKey::unique(), MessageKey::unique());
    }
}
