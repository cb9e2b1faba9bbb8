//! Time-accurate replay of a recorded sequence through an [`InputSink`]

use crate::events::{wait_interval, Event, EventKind, EventSequence};
use mimic_core::{move_delta, Button, Error, InputSink, Key, Result, StopSignal};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suspends playback between events
pub trait Pacer {
    fn pause(&mut self, seconds: f64);
}

/// Sleeps the current thread for the whole interval
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, seconds: f64) {
        if let Ok(wait) = Duration::try_from_secs_f64(seconds) {
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
    }
}

/// Player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Abort on identifiers that do not resolve instead of skipping the event
    pub strict: bool,
    /// Release keys and buttons still held down once playback ends
    pub release_held: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            release_held: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Done,
}

/// An event that was not dispatched
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEvent {
    pub index: usize,
    pub reason: String,
}

/// What a playback run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayReport {
    pub moves: usize,
    pub clicks: usize,
    pub scrolls: usize,
    pub key_presses: usize,
    pub key_releases: usize,
    pub skipped: Vec<SkippedEvent>,
    /// Playback stopped early on the cancel signal
    pub cancelled: bool,
}

impl PlayReport {
    pub fn dispatched(&self) -> usize {
        self.moves + self.clicks + self.scrolls + self.key_presses + self.key_releases
    }

    fn count(&mut self, kind: &EventKind) {
        match kind {
            EventKind::MouseMove { .. } => self.moves += 1,
            EventKind::MouseClick { .. } => self.clicks += 1,
            EventKind::MouseScroll { .. } => self.scrolls += 1,
            EventKind::KeyPress { .. } => self.key_presses += 1,
            EventKind::KeyRelease { .. } => self.key_releases += 1,
        }
    }
}

/// Replays an [`EventSequence`], reproducing the recorded gaps between events
pub struct Player<S: InputSink, P: Pacer = ThreadPacer> {
    sink: S,
    pacer: P,
    config: PlayerConfig,
    cancel: StopSignal,
    state: PlayerState,
    held_keys: Vec<Key>,
    held_buttons: Vec<Button>,
}

impl<S: InputSink> Player<S> {
    pub fn new(sink: S) -> Self {
        Self::with_pacer(sink, ThreadPacer)
    }
}

impl<S: InputSink, P: Pacer> Player<S, P> {
    pub fn with_pacer(sink: S, pacer: P) -> Self {
        Self {
            sink,
            pacer,
            config: PlayerConfig::default(),
            cancel: StopSignal::new(),
            state: PlayerState::Idle,
            held_keys: Vec::new(),
            held_buttons: Vec::new(),
        }
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Stop before the next wait once `signal` is raised
    pub fn cancel_on(mut self, signal: StopSignal) -> Self {
        self.cancel = signal;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Replay the sequence in order.
    ///
    /// Unresolvable identifiers skip their event (unless strict). Any other
    /// failure stops playback with [`Error::Playback`] naming the event index.
    pub fn play(&mut self, sequence: &EventSequence) -> Result<PlayReport> {
        self.state = PlayerState::Playing;
        debug!(events = sequence.len(), "playback started");

        let result = self.run(sequence);
        if self.config.release_held {
            self.release_held();
        }
        self.state = PlayerState::Done;

        if let Ok(report) = &result {
            info!(
                dispatched = report.dispatched(),
                skipped = report.skipped.len(),
                cancelled = report.cancelled,
                "playback finished"
            );
        }
        result
    }

    fn run(&mut self, sequence: &EventSequence) -> Result<PlayReport> {
        let mut report = PlayReport::default();
        let mut previous = 0.0;

        for (index, event) in sequence.iter().enumerate() {
            if self.cancel.is_raised() {
                info!(index, "playback cancelled");
                report.cancelled = true;
                break;
            }
            if event.timestamp < previous {
                warn!(index, timestamp = event.timestamp, previous, "timestamp goes backwards");
            }
            self.pacer.pause(wait_interval(previous, event.timestamp));
            previous = event.timestamp;

            match self.dispatch(event) {
                Ok(()) => report.count(&event.kind),
                Err(e) if !e.is_fatal() && !self.config.strict => {
                    warn!(index, error = %e, "skipping event");
                    report.skipped.push(SkippedEvent {
                        index,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(Error::Playback {
                        index,
                        source: Box::new(e),
                    })
                }
            }
        }
        Ok(report)
    }

    fn dispatch(&mut self, event: &Event) -> Result<()> {
        match &event.kind {
            EventKind::MouseMove { x, y } => {
                if self.sink.supports_absolute_move() {
                    self.sink.move_to(*x, *y)
                } else {
                    let (dx, dy) = move_delta(self.sink.pointer()?, (*x, *y));
                    self.sink.move_by(dx, dy)
                }
            }
            EventKind::MouseClick {
                button, pressed, ..
            } => {
                let button = button.resolve()?;
                self.sink.button(button, *pressed)?;
                track(&mut self.held_buttons, button, *pressed);
                Ok(())
            }
            EventKind::MouseScroll { dx, dy, .. } => self.sink.scroll(*dx, *dy),
            EventKind::KeyPress { key } => {
                let key = key.resolve()?;
                self.sink.key(key, true)?;
                track(&mut self.held_keys, key, true);
                Ok(())
            }
            EventKind::KeyRelease { key } => {
                let key = key.resolve()?;
                self.sink.key(key, false)?;
                track(&mut self.held_keys, key, false);
                Ok(())
            }
        }
    }

    fn release_held(&mut self) {
        for key in std::mem::take(&mut self.held_keys) {
            debug!(%key, "releasing held key");
            if let Err(e) = self.sink.key(key, false) {
                warn!(%key, error = %e, "cannot release key");
            }
        }
        for button in std::mem::take(&mut self.held_buttons) {
            debug!(%button, "releasing held button");
            if let Err(e) = self.sink.button(button, false) {
                warn!(%button, error = %e, "cannot release button");
            }
        }
    }
}

fn track<T: PartialEq>(held: &mut Vec<T>, item: T, pressed: bool) {
    if pressed {
        if !held.contains(&item) {
            held.push(item);
        }
    } else {
        held.retain(|h| *h != item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_core::{ButtonId, ErrorCode, KeyId};

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        MoveTo(i32, i32),
        MoveBy(i32, i32),
        Button(Button, bool),
        Scroll(i32, i32),
        Key(Key, bool),
    }

    struct RecordingSink {
        absolute: bool,
        position: (i32, i32),
        actions: Vec<Action>,
        fail_scroll: bool,
    }

    impl RecordingSink {
        fn absolute() -> Self {
            Self {
                absolute: true,
                position: (0, 0),
                actions: Vec::new(),
                fail_scroll: false,
            }
        }

        fn relative_at(x: i32, y: i32) -> Self {
            Self {
                absolute: false,
                position: (x, y),
                ..Self::absolute()
            }
        }
    }

    impl InputSink for RecordingSink {
        fn supports_absolute_move(&self) -> bool {
            self.absolute
        }

        fn pointer(&mut self) -> Result<(i32, i32)> {
            Ok(self.position)
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.position = (x, y);
            self.actions.push(Action::MoveTo(x, y));
            Ok(())
        }

        fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
            self.position = (self.position.0 + dx, self.position.1 + dy);
            self.actions.push(Action::MoveBy(dx, dy));
            Ok(())
        }

        fn button(&mut self, button: Button, pressed: bool) -> Result<()> {
            self.actions.push(Action::Button(button, pressed));
            Ok(())
        }

        fn scroll(&mut self, dx: i32, dy: i32) -> Result<()> {
            if self.fail_scroll {
                return Err(Error::Synthesis("scroll refused".into()));
            }
            self.actions.push(Action::Scroll(dx, dy));
            Ok(())
        }

        fn key(&mut self, key: Key, pressed: bool) -> Result<()> {
            self.actions.push(Action::Key(key, pressed));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        waits: Vec<f64>,
        raise_after: Option<(usize, StopSignal)>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&mut self, seconds: f64) {
            self.waits.push(seconds);
            if let Some((n, signal)) = &self.raise_after {
                if self.waits.len() >= *n {
                    signal.raise();
                }
            }
        }
    }

    fn player(sink: RecordingSink) -> Player<RecordingSink, RecordingPacer> {
        Player::with_pacer(sink, RecordingPacer::default())
    }

    fn ev(t: f64, kind: EventKind) -> Event {
        Event::new(t, kind)
    }

    fn press(t: f64, key: Key) -> Event {
        ev(t, EventKind::KeyPress { key: key.into() })
    }

    fn release(t: f64, key: Key) -> Event {
        ev(t, EventKind::KeyRelease { key: key.into() })
    }

    fn mv(t: f64, x: i32, y: i32) -> Event {
        ev(t, EventKind::MouseMove { x, y })
    }

    #[test]
    fn every_kind_dispatches_once() {
        let seq = EventSequence::from_events(vec![
            mv(0.0, 10, 20),
            ev(
                0.1,
                EventKind::MouseClick {
                    x: 10,
                    y: 20,
                    button: Button::Left.into(),
                    pressed: true,
                },
            ),
            ev(
                0.2,
                EventKind::MouseClick {
                    x: 10,
                    y: 20,
                    button: Button::Left.into(),
                    pressed: false,
                },
            ),
            ev(0.3, EventKind::MouseScroll { x: 10, y: 20, dx: 0, dy: -3 }),
            press(0.4, Key::Char('a')),
            release(0.5, Key::Char('a')),
        ]);
        let mut player = player(RecordingSink::absolute());
        let report = player.play(&seq).unwrap();

        assert_eq!(
            player.sink().actions,
            vec![
                Action::MoveTo(10, 20),
                Action::Button(Button::Left, true),
                Action::Button(Button::Left, false),
                Action::Scroll(0, -3),
                Action::Key(Key::Char('a'), true),
                Action::Key(Key::Char('a'), false),
            ]
        );
        assert_eq!(report.moves, 1);
        assert_eq!(report.clicks, 2);
        assert_eq!(report.scrolls, 1);
        assert_eq!(report.key_presses, 1);
        assert_eq!(report.key_releases, 1);
        assert_eq!(report.dispatched(), 6);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn waits_reproduce_recorded_gaps() {
        let seq: EventSequence = [0.0, 0.9, 1.0, 12.0]
            .iter()
            .map(|t| mv(*t, 0, 0))
            .collect();
        let mut player = player(RecordingSink::absolute());
        player.play(&seq).unwrap();

        let expected = [0.0, 0.9, 0.1, 11.0];
        let waits = &player.pacer().waits;
        assert_eq!(waits.len(), expected.len());
        for (w, e) in waits.iter().zip(expected) {
            assert!((w - e).abs() < 1e-9, "{w} != {e}");
        }
    }

    #[test]
    fn backwards_timestamps_do_not_wait() {
        let seq = EventSequence::from_events(vec![mv(2.0, 0, 0), mv(1.0, 0, 0), mv(1.5, 0, 0)]);
        let mut player = player(RecordingSink::absolute());
        player.play(&seq).unwrap();
        assert_eq!(player.pacer().waits, vec![2.0, 0.0, 0.5]);
    }

    #[test]
    fn relative_move_uses_delta_from_pointer() {
        let seq = EventSequence::from_events(vec![mv(0.0, 4, 3)]);
        let mut player = player(RecordingSink::relative_at(2, 1));
        player.play(&seq).unwrap();
        assert_eq!(player.sink().actions, vec![Action::MoveBy(2, 2)]);
        assert_eq!(player.sink().position, (4, 3));
    }

    #[test]
    fn unknown_identifier_is_skipped() {
        let seq = EventSequence::from_events(vec![
            press(0.0, Key::Char('a')),
            ev(0.1, EventKind::KeyPress { key: KeyId::new("hyper") }),
            ev(
                0.2,
                EventKind::MouseClick {
                    x: 0,
                    y: 0,
                    button: ButtonId::new("thumb"),
                    pressed: true,
                },
            ),
            release(0.3, Key::Char('a')),
        ]);
        let mut player = player(RecordingSink::absolute());
        let report = player.play(&seq).unwrap();

        assert_eq!(report.dispatched(), 2);
        let indices: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(report.skipped[0].reason.contains("hyper"));
    }

    #[test]
    fn strict_mode_aborts_on_unknown_identifier() {
        let seq = EventSequence::from_events(vec![
            press(0.0, Key::Char('a')),
            ev(0.1, EventKind::KeyPress { key: KeyId::new("hyper") }),
            release(0.2, Key::Char('a')),
        ]);
        let mut player = player(RecordingSink::absolute()).strict(true);
        let err = player.play(&seq).unwrap_err();

        assert!(matches!(err, Error::Playback { index: 1, .. }));
        assert_eq!(err.root().code(), ErrorCode::UnknownIdentifier);
        assert_eq!(player.state(), PlayerState::Done);
    }

    #[test]
    fn synthesis_failure_stops_with_index() {
        let mut sink = RecordingSink::absolute();
        sink.fail_scroll = true;
        let seq = EventSequence::from_events(vec![
            mv(0.0, 1, 1),
            ev(0.1, EventKind::MouseScroll { x: 1, y: 1, dx: 0, dy: 1 }),
            mv(0.2, 2, 2),
        ]);
        let mut player = player(sink);
        let err = player.play(&seq).unwrap_err();

        assert!(matches!(err, Error::Playback { index: 1, .. }));
        assert_eq!(player.sink().actions, vec![Action::MoveTo(1, 1)]);
    }

    #[test]
    fn held_keys_and_buttons_are_released_at_the_end() {
        let seq = EventSequence::from_events(vec![
            press(0.0, Key::ShiftLeft),
            ev(
                0.1,
                EventKind::MouseClick {
                    x: 0,
                    y: 0,
                    button: Button::Right.into(),
                    pressed: true,
                },
            ),
            press(0.2, Key::Char('x')),
            release(0.3, Key::Char('x')),
        ]);
        let mut player = player(RecordingSink::absolute());
        player.play(&seq).unwrap();

        let tail = &player.sink().actions[4..];
        assert_eq!(
            tail,
            &[
                Action::Key(Key::ShiftLeft, false),
                Action::Button(Button::Right, false),
            ]
        );
    }

    #[test]
    fn held_release_can_be_disabled() {
        let seq = EventSequence::from_events(vec![press(0.0, Key::ShiftLeft)]);
        let mut player = player(RecordingSink::absolute()).config(PlayerConfig {
            release_held: false,
            ..PlayerConfig::default()
        });
        player.play(&seq).unwrap();
        assert_eq!(player.sink().actions, vec![Action::Key(Key::ShiftLeft, true)]);
    }

    #[test]
    fn cancel_before_start_dispatches_nothing() {
        let signal = StopSignal::new();
        signal.raise();
        let seq = EventSequence::from_events(vec![mv(0.0, 1, 1), mv(0.5, 2, 2)]);
        let mut player = player(RecordingSink::absolute()).cancel_on(signal);
        let report = player.play(&seq).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.dispatched(), 0);
        assert!(player.pacer().waits.is_empty());
    }

    #[test]
    fn cancel_mid_playback_stops_before_next_wait() {
        let signal = StopSignal::new();
        let pacer = RecordingPacer {
            waits: Vec::new(),
            raise_after: Some((2, signal.clone())),
        };
        let seq = EventSequence::from_events(vec![mv(0.0, 1, 1), mv(0.5, 2, 2), mv(1.0, 3, 3)]);
        let mut player = Player::with_pacer(RecordingSink::absolute(), pacer).cancel_on(signal);
        let report = player.play(&seq).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.moves, 2);
        assert_eq!(player.pacer().waits.len(), 2);
    }

    #[test]
    fn state_machine_and_replay() {
        let seq = EventSequence::from_events(vec![mv(0.0, 1, 1)]);
        let mut player = player(RecordingSink::absolute());
        assert_eq!(player.state(), PlayerState::Idle);

        player.play(&seq).unwrap();
        assert_eq!(player.state(), PlayerState::Done);

        player.play(&seq).unwrap();
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(player.sink().actions.len(), 2);
    }

    #[test]
    fn empty_sequence_plays_nothing() {
        let mut player = player(RecordingSink::absolute());
        let report = player.play(&EventSequence::new()).unwrap();
        assert_eq!(report, PlayReport::default());
    }

    #[test]
    fn thread_pacer_ignores_bad_intervals() {
        let mut pacer = ThreadPacer;
        pacer.pause(-1.0);
        pacer.pause(f64::NAN);
        pacer.pause(0.0);
    }
}
