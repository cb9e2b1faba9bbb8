//! Mouse and keyboard recorders
//!
//! Each recorder subscribes to one device on an [`InputSource`] and drains
//! its channel on the calling thread until a stop gesture fires or its
//! [`StopSignal`] is raised. A source that closes before then aborts the
//! capture.

use crate::events::{Event, EventKind, EventSequence};
use crossbeam_channel::RecvTimeoutError;
use mimic_core::{
    Button, Clock, Device, Error, InputSource, Key, RawInput, Result, Stamped, StopSignal,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// How often the session checks whether a recorder has finished
    pub poll_interval: Duration,
    /// How long a recorder blocks on its channel before rechecking its stop signal
    pub drain_interval: Duration,
    /// Keys that end keyboard capture when held together
    pub stop_chord: [Key; 2],
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            drain_interval: Duration::from_millis(50),
            stop_chord: [Key::Char('q'), Key::Esc],
        }
    }
}

/// Whether capture should go on after an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

trait Capture {
    const DEVICE: Device;

    fn handle(&mut self, stamped: Stamped) -> Flow;

    fn into_sequence(self) -> EventSequence;
}

fn run_capture<C: Capture>(
    mut capture: C,
    source: &dyn InputSource,
    stop: &StopSignal,
    drain_interval: Duration,
) -> Result<EventSequence> {
    let device = C::DEVICE;
    let subscription = source.subscribe(device)?;
    debug!(%device, "capture started");

    loop {
        if stop.is_raised() {
            debug!(%device, "capture stopped externally");
            break;
        }
        match subscription.receiver().recv_timeout(drain_interval) {
            Ok(stamped) => {
                if capture.handle(stamped) == Flow::Stop {
                    info!(%device, "stop gesture detected");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if stop.is_raised() {
                    break;
                }
                warn!(%device, "input source closed during capture");
                return Err(Error::capture_aborted(device, "input source closed"));
            }
        }
    }

    drop(subscription);
    let sequence = capture.into_sequence();
    debug!(%device, events = sequence.len(), "capture finished");
    Ok(sequence)
}

// ============================================================================
// Mouse
// ============================================================================

/// Captures moves, clicks and scrolls.
///
/// Two button presses without a release in between stop the capture.
pub struct MouseRecorder {
    clock: Clock,
    stop: StopSignal,
    drain_interval: Duration,
    button_is_pressed: bool,
    events: Vec<Event>,
}

impl MouseRecorder {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            stop: StopSignal::new(),
            drain_interval: RecorderConfig::default().drain_interval,
            button_is_pressed: false,
            events: Vec::new(),
        }
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Signal that ends [`MouseRecorder::record`] from another thread
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn on_move(&mut self, x: i32, y: i32, at: Instant) {
        self.push(at, EventKind::MouseMove { x, y });
    }

    pub fn on_click(&mut self, x: i32, y: i32, button: Button, pressed: bool, at: Instant) -> Flow {
        self.push(
            at,
            EventKind::MouseClick {
                x,
                y,
                button: button.into(),
                pressed,
            },
        );
        self.exit_gesture(pressed)
    }

    pub fn on_scroll(&mut self, x: i32, y: i32, dx: i32, dy: i32, at: Instant) {
        self.push(at, EventKind::MouseScroll { x, y, dx, dy });
    }

    /// Block until the capture ends, returning everything captured
    pub fn record(self, source: &dyn InputSource) -> Result<EventSequence> {
        let stop = self.stop.clone();
        let drain = self.drain_interval;
        run_capture(self, source, &stop, drain)
    }

    // A press while another press is outstanding stops; any release re-arms.
    fn exit_gesture(&mut self, pressed: bool) -> Flow {
        if !pressed {
            self.button_is_pressed = false;
            return Flow::Continue;
        }
        if self.button_is_pressed {
            Flow::Stop
        } else {
            self.button_is_pressed = true;
            Flow::Continue
        }
    }

    fn push(&mut self, at: Instant, kind: EventKind) {
        self.events.push(Event::new(self.clock.seconds_at(at), kind));
    }
}

impl Capture for MouseRecorder {
    const DEVICE: Device = Device::Mouse;

    fn handle(&mut self, stamped: Stamped) -> Flow {
        match stamped.input {
            RawInput::Move { x, y } => {
                self.on_move(x, y, stamped.at);
                Flow::Continue
            }
            RawInput::Button {
                x,
                y,
                button,
                pressed,
            } => self.on_click(x, y, button, pressed, stamped.at),
            RawInput::Wheel { x, y, dx, dy } => {
                self.on_scroll(x, y, dx, dy, stamped.at);
                Flow::Continue
            }
            RawInput::Key { .. } => Flow::Continue,
        }
    }

    fn into_sequence(self) -> EventSequence {
        EventSequence::from_events(self.events)
    }
}

// ============================================================================
// Keyboard
// ============================================================================

/// Keys currently held down, as seen by one keyboard recorder
#[derive(Debug, Default, Clone)]
pub struct PressedKeys {
    keys: HashSet<Key>,
}

impl PressedKeys {
    pub fn insert(&mut self, key: Key) {
        self.keys.insert(key);
    }

    /// Returns false if the key was not marked as pressed
    pub fn remove(&mut self, key: Key) -> bool {
        self.keys.remove(&key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    pub fn contains_all(&self, keys: &[Key]) -> bool {
        keys.iter().all(|k| self.keys.contains(k))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Captures key presses and releases.
///
/// Holding both keys of the stop chord (`q` + `esc` by default) stops the
/// capture.
pub struct KeyboardRecorder {
    clock: Clock,
    stop: StopSignal,
    drain_interval: Duration,
    stop_chord: [Key; 2],
    pressed: PressedKeys,
    stop_fired: bool,
    events: Vec<Event>,
}

impl KeyboardRecorder {
    pub fn new(clock: Clock) -> Self {
        let config = RecorderConfig::default();
        Self {
            clock,
            stop: StopSignal::new(),
            drain_interval: config.drain_interval,
            stop_chord: config.stop_chord,
            pressed: PressedKeys::default(),
            stop_fired: false,
            events: Vec::new(),
        }
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn stop_chord(mut self, chord: [Key; 2]) -> Self {
        self.stop_chord = chord;
        self
    }

    /// Signal that ends [`KeyboardRecorder::record`] from another thread
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn pressed(&self) -> &PressedKeys {
        &self.pressed
    }

    pub fn on_press(&mut self, key: Key, at: Instant) -> Flow {
        self.pressed.insert(key);
        self.push(at, EventKind::KeyPress { key: key.into() });

        if !self.stop_fired && self.pressed.contains_all(&self.stop_chord) {
            self.stop_fired = true;
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// A release without a matching press (the OS may deliver events out of
    /// order, or the key was held before capture began) is recorded anyway.
    pub fn on_release(&mut self, key: Key, at: Instant) {
        if !self.pressed.remove(key) {
            warn!(%key, "release without matching press");
        }
        self.push(at, EventKind::KeyRelease { key: key.into() });
    }

    /// Block until the capture ends, returning everything captured
    pub fn record(self, source: &dyn InputSource) -> Result<EventSequence> {
        let stop = self.stop.clone();
        let drain = self.drain_interval;
        run_capture(self, source, &stop, drain)
    }

    fn push(&mut self, at: Instant, kind: EventKind) {
        self.events.push(Event::new(self.clock.seconds_at(at), kind));
    }
}

impl Capture for KeyboardRecorder {
    const DEVICE: Device = Device::Keyboard;

    fn handle(&mut self, stamped: Stamped) -> Flow {
        match stamped.input {
            RawInput::Key { key, pressed: true } => self.on_press(key, stamped.at),
            RawInput::Key { key, pressed: false } => {
                self.on_release(key, stamped.at);
                Flow::Continue
            }
            _ => Flow::Continue,
        }
    }

    fn into_sequence(mut self) -> EventSequence {
        if !self.pressed.is_empty() {
            debug!(held = self.pressed.len(), "keys still held at teardown");
        }
        self.pressed.clear();
        EventSequence::from_events(self.events)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use mimic_core::Subscription;
    use fixtures::ScriptedSource;

    /// Test sources, shared with the session tests
    pub(crate) mod fixtures {
        use super::*;
        use parking_lot::Mutex;

        /// Hands out pre-filled channels per device. Senders stay alive in
        /// the source unless `close` is set, so a recorder only returns on a
        /// gesture or its stop signal.
        pub(crate) struct ScriptedSource {
            mouse: Mutex<Option<Receiver<Stamped>>>,
            keyboard: Mutex<Option<Receiver<Stamped>>>,
            senders: Mutex<Vec<Sender<Stamped>>>,
            fail: Option<Device>,
        }

        impl ScriptedSource {
            pub(crate) fn new(inputs: Vec<Stamped>, close: bool) -> Self {
                let (mtx, mrx) = unbounded();
                let (ktx, krx) = unbounded();
                for s in inputs {
                    match s.input.device() {
                        Device::Mouse => mtx.send(s).unwrap(),
                        Device::Keyboard => ktx.send(s).unwrap(),
                    }
                }
                let senders = if close { Vec::new() } else { vec![mtx, ktx] };
                Self {
                    mouse: Mutex::new(Some(mrx)),
                    keyboard: Mutex::new(Some(krx)),
                    senders: Mutex::new(senders),
                    fail: None,
                }
            }

            pub(crate) fn failing(device: Device) -> Self {
                let mut source = Self::new(Vec::new(), false);
                source.fail = Some(device);
                source
            }

            pub(crate) fn close(&self) {
                self.senders.lock().clear();
            }
        }

        impl InputSource for ScriptedSource {
            fn subscribe(&self, device: Device) -> Result<Subscription> {
                if self.fail == Some(device) {
                    return Err(Error::hook_install(device, "permission denied"));
                }
                let slot = match device {
                    Device::Mouse => &self.mouse,
                    Device::Keyboard => &self.keyboard,
                };
                let rx = slot.lock().take().expect("subscribed twice");
                Ok(Subscription::new(rx))
            }
        }
    }

    fn at(clock: &Clock, secs: f64) -> Instant {
        clock.instant_at(secs)
    }

    fn stamped(clock: &Clock, secs: f64, input: RawInput) -> Stamped {
        Stamped {
            at: at(clock, secs),
            input,
        }
    }

    fn click(clock: &Clock, secs: f64, button: Button, pressed: bool) -> Stamped {
        stamped(
            clock,
            secs,
            RawInput::Button {
                x: 5,
                y: 6,
                button,
                pressed,
            },
        )
    }

    fn key(clock: &Clock, secs: f64, key: Key, pressed: bool) -> Stamped {
        stamped(clock, secs, RawInput::Key { key, pressed })
    }

    #[test]
    fn mouse_events_are_timestamped_from_the_clock() {
        let clock = Clock::now();
        let mut rec = MouseRecorder::new(clock);
        rec.on_move(2, 3, at(&clock, 1.5));
        rec.on_scroll(0, 999, 0, -1, at(&clock, 2.25));
        assert_eq!(
            rec.events(),
            &[
                Event::new(1.5, EventKind::MouseMove { x: 2, y: 3 }),
                Event::new(2.25, EventKind::MouseScroll { x: 0, y: 999, dx: 0, dy: -1 }),
            ]
        );
    }

    #[test]
    fn one_press_does_not_stop() {
        let clock = Clock::now();
        let mut rec = MouseRecorder::new(clock);
        assert_eq!(rec.on_click(10, 20, Button::Left, true, at(&clock, 0.1)), Flow::Continue);
        assert_eq!(
            rec.events()[0].kind,
            EventKind::MouseClick {
                x: 10,
                y: 20,
                button: Button::Left.into(),
                pressed: true
            }
        );
    }

    #[test]
    fn two_presses_without_release_stop() {
        let clock = Clock::now();
        let mut rec = MouseRecorder::new(clock);
        assert_eq!(rec.on_click(0, 0, Button::Left, true, at(&clock, 0.1)), Flow::Continue);
        assert_eq!(rec.on_click(0, 0, Button::Right, true, at(&clock, 0.2)), Flow::Stop);
        // the stopping press is still recorded
        assert_eq!(rec.events().len(), 2);
    }

    #[test]
    fn release_rearms_the_latch() {
        let clock = Clock::now();
        let mut rec = MouseRecorder::new(clock);
        assert_eq!(rec.on_click(0, 0, Button::Left, true, at(&clock, 0.1)), Flow::Continue);
        assert_eq!(rec.on_click(0, 0, Button::Left, false, at(&clock, 0.2)), Flow::Continue);
        assert_eq!(rec.on_click(0, 0, Button::Right, true, at(&clock, 0.3)), Flow::Continue);
    }

    #[test]
    fn release_while_unlatched_keeps_going() {
        let clock = Clock::now();
        let mut rec = MouseRecorder::new(clock);
        assert_eq!(rec.on_click(0, 0, Button::Left, false, at(&clock, 0.1)), Flow::Continue);
        assert_eq!(rec.on_click(0, 0, Button::Left, true, at(&clock, 0.2)), Flow::Continue);
    }

    #[test]
    fn mouse_record_ends_on_gesture() {
        let clock = Clock::now();
        let inputs = vec![
            stamped(&clock, 0.125, RawInput::Move { x: 1, y: 1 }),
            click(&clock, 0.25, Button::Left, true),
            click(&clock, 0.375, Button::Right, true),
            // never reached
            stamped(&clock, 0.5, RawInput::Move { x: 9, y: 9 }),
        ];
        let source = ScriptedSource::new(inputs, false);
        let seq = MouseRecorder::new(clock).record(&source).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.events()[2].timestamp, 0.375);
    }

    #[test]
    fn mouse_record_ends_on_stop_signal() {
        let clock = Clock::now();
        let source = ScriptedSource::new(
            vec![stamped(&clock, 0.1, RawInput::Move { x: 1, y: 1 })],
            false,
        );
        let rec = MouseRecorder::new(clock).drain_interval(Duration::from_millis(5));
        let stop = rec.stop_handle();
        let handle = std::thread::spawn(move || rec.record(&source));
        std::thread::sleep(Duration::from_millis(30));
        stop.raise();
        let seq = handle.join().unwrap().unwrap();
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn hook_failure_fails_fast() {
        let source = ScriptedSource::failing(Device::Mouse);
        let err = MouseRecorder::new(Clock::now()).record(&source).unwrap_err();
        assert!(matches!(err, Error::HookInstall { device: Device::Mouse, .. }));
    }

    #[test]
    fn keyboard_events_and_pressed_set() {
        let clock = Clock::now();
        let mut rec = KeyboardRecorder::new(clock);
        rec.on_press(Key::Char('q'), at(&clock, 0.5));
        rec.on_press(Key::Char('b'), at(&clock, 0.625));
        assert_eq!(rec.pressed().len(), 2);

        rec.on_release(Key::Char('b'), at(&clock, 0.75));
        assert!(rec.pressed().contains(Key::Char('q')));
        assert!(!rec.pressed().contains(Key::Char('b')));
        assert_eq!(
            rec.events()[2],
            Event::new(0.75, EventKind::KeyRelease { key: Key::Char('b').into() })
        );
    }

    #[test]
    fn release_without_press_is_recorded_not_fatal() {
        let clock = Clock::now();
        let mut rec = KeyboardRecorder::new(clock);
        rec.on_release(Key::Tab, at(&clock, 0.1));
        assert!(rec.pressed().is_empty());
        assert_eq!(rec.events().len(), 1);
    }

    #[test]
    fn stop_chord_in_either_order() {
        for chord in [[Key::Char('q'), Key::Esc], [Key::Esc, Key::Char('q')]] {
            let clock = Clock::now();
            let mut rec = KeyboardRecorder::new(clock);
            assert_eq!(rec.on_press(chord[0], at(&clock, 0.1)), Flow::Continue);
            assert_eq!(rec.on_press(chord[1], at(&clock, 0.2)), Flow::Stop);
        }
    }

    #[test]
    fn stop_chord_fires_once() {
        let clock = Clock::now();
        let mut rec = KeyboardRecorder::new(clock);
        rec.on_press(Key::Char('q'), at(&clock, 0.1));
        assert_eq!(rec.on_press(Key::Esc, at(&clock, 0.2)), Flow::Stop);
        assert_eq!(rec.on_press(Key::Esc, at(&clock, 0.3)), Flow::Continue);
    }

    #[test]
    fn released_chord_key_does_not_stop() {
        let clock = Clock::now();
        let mut rec = KeyboardRecorder::new(clock);
        rec.on_press(Key::Char('q'), at(&clock, 0.1));
        rec.on_release(Key::Char('q'), at(&clock, 0.2));
        assert_eq!(rec.on_press(Key::Esc, at(&clock, 0.3)), Flow::Continue);
    }

    #[test]
    fn custom_chord() {
        let clock = Clock::now();
        let mut rec = KeyboardRecorder::new(clock).stop_chord([Key::CtrlLeft, Key::F12]);
        rec.on_press(Key::Char('q'), at(&clock, 0.1));
        assert_eq!(rec.on_press(Key::Esc, at(&clock, 0.2)), Flow::Continue);
        rec.on_press(Key::CtrlLeft, at(&clock, 0.3));
        assert_eq!(rec.on_press(Key::F12, at(&clock, 0.4)), Flow::Stop);
    }

    #[test]
    fn keyboard_record_ends_on_chord() {
        let clock = Clock::now();
        let inputs = vec![
            key(&clock, 0.1, Key::Char('h'), true),
            key(&clock, 0.2, Key::Char('h'), false),
            key(&clock, 0.3, Key::Char('q'), true),
            key(&clock, 0.4, Key::Esc, true),
            key(&clock, 0.5, Key::Esc, false),
        ];
        let source = ScriptedSource::new(inputs, false);
        let seq = KeyboardRecorder::new(clock).record(&source).unwrap();
        assert_eq!(seq.len(), 4);
        assert_eq!(
            seq.events()[3].kind,
            EventKind::KeyPress { key: Key::Esc.into() }
        );
    }

    #[test]
    fn source_closing_mid_capture_aborts() {
        let clock = Clock::now();
        let source = ScriptedSource::new(vec![key(&clock, 0.1, Key::Space, true)], true);
        let err = KeyboardRecorder::new(clock).record(&source).unwrap_err();
        assert!(matches!(
            err,
            Error::CaptureAborted {
                device: Device::Keyboard,
                ..
            }
        ));
    }
}
