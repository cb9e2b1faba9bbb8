//! Recording session: both recorders side by side on one clock

use crate::events::EventSequence;
use crate::recorder::{KeyboardRecorder, MouseRecorder, RecorderConfig};
use mimic_core::{Clock, Device, Error, InputSource, Result, StopSignal};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Runs a mouse and a keyboard recorder concurrently and merges what they
/// capture. Whichever stops first stops the other.
pub struct RecordingSession {
    config: RecorderConfig,
    stop: StopSignal,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::with_config(RecorderConfig::default())
    }

    pub fn with_config(config: RecorderConfig) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
        }
    }

    /// Share an existing stop signal instead of the session's own
    pub fn stop_on(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Raising this ends both recorders (e.g. from a Ctrl+C handler)
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Record until a stop gesture or the session's stop signal, then
    /// return both captures merged in timestamp order.
    pub fn record(&self, source: Arc<dyn InputSource>) -> Result<EventSequence> {
        let clock = Clock::now();

        let mouse = MouseRecorder::new(clock).drain_interval(self.config.drain_interval);
        let keyboard = KeyboardRecorder::new(clock)
            .drain_interval(self.config.drain_interval)
            .stop_chord(self.config.stop_chord);
        let mouse_stop = mouse.stop_handle();
        let keyboard_stop = keyboard.stop_handle();

        let mouse_thread = {
            let source = Arc::clone(&source);
            spawn_recorder(Device::Mouse, move || mouse.record(source.as_ref()))?
        };
        let keyboard_thread = {
            let source = Arc::clone(&source);
            spawn_recorder(Device::Keyboard, move || keyboard.record(source.as_ref()))
        };
        let keyboard_thread = match keyboard_thread {
            Ok(handle) => handle,
            Err(e) => {
                mouse_stop.raise();
                let _ = mouse_thread.join();
                return Err(e);
            }
        };

        info!(
            chord = %format!("{}+{}", self.config.stop_chord[0], self.config.stop_chord[1]),
            "recording; press two mouse buttons together or hold the chord to stop"
        );

        loop {
            if self.stop.is_raised() {
                debug!("session stop requested");
                break;
            }
            if mouse_thread.is_finished() {
                debug!("mouse recorder finished, stopping keyboard");
                break;
            }
            if keyboard_thread.is_finished() {
                debug!("keyboard recorder finished, stopping mouse");
                break;
            }
            thread::sleep(self.config.poll_interval);
        }
        mouse_stop.raise();
        keyboard_stop.raise();

        let mouse_events = join_recorder(Device::Mouse, mouse_thread);
        let keyboard_events = join_recorder(Device::Keyboard, keyboard_thread);
        let (mouse_events, keyboard_events) = (mouse_events?, keyboard_events?);

        info!(
            mouse = mouse_events.len(),
            keyboard = keyboard_events.len(),
            "recording finished"
        );
        Ok(EventSequence::merge(mouse_events, keyboard_events))
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_recorder<F>(device: Device, run: F) -> Result<JoinHandle<Result<EventSequence>>>
where
    F: FnOnce() -> Result<EventSequence> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{device}-recorder"))
        .spawn(run)
        .map_err(|e| Error::capture_aborted(device, format!("cannot spawn thread: {e}")))
}

fn join_recorder(
    device: Device,
    handle: JoinHandle<Result<EventSequence>>,
) -> Result<EventSequence> {
    handle
        .join()
        .map_err(|_| Error::capture_aborted(device, "recorder thread panicked"))?
}
