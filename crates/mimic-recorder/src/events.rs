//! Recorded events and the time-ordered sequence that drives playback

use mimic_core::{ButtonId, KeyId};

/// Single captured event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds since the recording clock's zero point
    pub timestamp: f64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(timestamp: f64, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }
}

/// Event payload. Click and scroll positions are informational; playback
/// acts at the current pointer position, as the recorded user did.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    MouseMove { x: i32, y: i32 },
    MouseClick { x: i32, y: i32, button: ButtonId, pressed: bool },
    MouseScroll { x: i32, y: i32, dx: i32, dy: i32 },
    KeyPress { key: KeyId },
    KeyRelease { key: KeyId },
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::MouseMove { .. } => "mouse_move",
            EventKind::MouseClick { .. } => "mouse_click",
            EventKind::MouseScroll { .. } => "mouse_scroll",
            EventKind::KeyPress { .. } => "key_press",
            EventKind::KeyRelease { .. } => "key_release",
        }
    }
}

/// Events in ascending timestamp order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSequence {
    events: Vec<Event>,
}

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap events as given, without reordering
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Concatenate both captures and stable-sort by timestamp. Events with
    /// equal timestamps keep their relative order, `first`'s before `second`'s.
    pub fn merge(first: EventSequence, second: EventSequence) -> Self {
        let mut events = first.events;
        events.extend(second.events);
        let mut merged = Self { events };
        merged.sort();
        merged
    }

    /// Stable sort by timestamp. NaN timestamps sort after every number.
    pub fn sort(&mut self) {
        self.events
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Whether timestamps never decrease
    pub fn is_ordered(&self) -> bool {
        self.events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
    }

    /// Seconds to wait before each event, counting from zero for the first
    pub fn intervals(&self) -> Vec<f64> {
        let mut previous = 0.0;
        self.events
            .iter()
            .map(|e| {
                let wait = wait_interval(previous, e.timestamp);
                previous = e.timestamp;
                wait
            })
            .collect()
    }
}

/// `current - previous`, never negative and never NaN
pub fn wait_interval(previous: f64, current: f64) -> f64 {
    let wait = current - previous;
    if wait.is_finite() && wait > 0.0 {
        wait
    } else {
        0.0
    }
}

impl FromIterator<Event> for EventSequence {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::from_events(iter.into_iter().collect())
    }
}

impl IntoIterator for EventSequence {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventSequence {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
