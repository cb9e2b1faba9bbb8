//! Recording storage - a single JSON document holding an array of records
//!
//! Two record layouts are understood:
//!
//! - **flat**: `{"eventType": "mouse_move", "coordinate": {"x": 1, "y": 2}, "time": 0.5}`
//! - **tagged**: `{"mouse_move": [{"coordinates": {"x": 1, "y": 2}}, {"time": 0.5}]}`
//!
//! The layout is detected from the first record; every other record must use
//! the same one. Records of an event type this version does not know are
//! skipped with a warning. Coordinates may be stored as floats and are rounded.

use crate::events::{Event, EventKind, EventSequence};
use mimic_core::{ButtonId, Error, KeyId, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Record layout of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    #[default]
    Flat,
    Tagged,
}

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Schema::Flat => "flat",
            Schema::Tagged => "tagged",
        }
    }
}

/// Somewhere a recording can be saved to and loaded from
pub trait EventStore {
    /// Replace whatever is stored with `sequence`
    fn save(&self, sequence: &EventSequence) -> Result<()>;

    fn load(&self) -> Result<EventSequence>;
}

/// Stores a recording as one JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    schema: Schema,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema: Schema::default(),
        }
    }

    /// Layout used when saving; loading always detects it
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load, also returning the layout the document was written in
    pub fn load_detected(&self) -> Result<(Schema, EventSequence)> {
        let bytes =
            fs::read(&self.path).map_err(|e| Error::persistence("read", &self.path, e))?;
        let (schema, sequence) = decode(&bytes).map_err(|e| e.at_path(&self.path))?;
        debug!(
            path = %self.path.display(),
            schema = schema.name(),
            events = sequence.len(),
            "recording loaded"
        );
        Ok((schema, sequence))
    }
}

impl EventStore for JsonFileStore {
    /// Writes a sibling temp file and renames it over the target, so a
    /// failed save leaves the previous recording in place.
    fn save(&self, sequence: &EventSequence) -> Result<()> {
        let tmp = temp_path(&self.path);
        let file = File::create(&tmp).map_err(|e| Error::persistence("create", &tmp, e))?;
        let mut w = BufWriter::new(file);

        let written = encode(&mut w, sequence, self.schema)
            .map_err(io::Error::from)
            .and_then(|_| w.flush());
        drop(w);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(Error::persistence("write", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::persistence("replace", &self.path, e));
        }

        debug!(
            path = %self.path.display(),
            schema = self.schema.name(),
            events = sequence.len(),
            "recording saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<EventSequence> {
        self.load_detected().map(|(_, sequence)| sequence)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("recording"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `sequence` as a JSON array in the given layout
pub fn encode<W: Write>(
    writer: W,
    sequence: &EventSequence,
    schema: Schema,
) -> serde_json::Result<()> {
    match schema {
        Schema::Flat => {
            let records: Vec<FlatRecord> = sequence.iter().map(FlatRecord::from).collect();
            serde_json::to_writer_pretty(writer, &records)
        }
        Schema::Tagged => {
            let records: Vec<TaggedRecord> = sequence.iter().map(TaggedRecord::from).collect();
            serde_json::to_writer_pretty(writer, &records)
        }
    }
}

/// Parse a stored document, detecting its layout.
///
/// Records with a well-formed envelope but an unknown event type are skipped.
/// Otherwise decoding fails on the first record that does not decode rather
/// than returning a partial sequence.
pub fn decode(bytes: &[u8]) -> Result<(Schema, EventSequence)> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::malformed(None, e.to_string()))?;
    let Value::Array(records) = document else {
        return Err(Error::malformed(None, "expected an array of event records"));
    };

    let schema = match records.first() {
        Some(first) => detect(first).ok_or_else(|| {
            Error::malformed(Some(0), "record is neither flat nor tagged")
        })?,
        None => Schema::default(),
    };

    let mut events = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if let Some(name) = event_name(&record, schema) {
            if !EVENT_NAMES.contains(&name) {
                warn!(index, event_type = name, "skipping record with unknown event type");
                continue;
            }
        }
        let event = match schema {
            Schema::Flat => serde_json::from_value::<FlatRecord>(record).map(Event::from),
            Schema::Tagged => serde_json::from_value::<TaggedRecord>(record).map(Event::from),
        }
        .map_err(|e| Error::malformed(Some(index), e.to_string()))?;

        if !(event.timestamp.is_finite() && event.timestamp >= 0.0) {
            return Err(Error::malformed(
                Some(index),
                format!("invalid time {}", event.timestamp),
            ));
        }
        events.push(event);
    }

    let mut sequence = EventSequence::from_events(events);
    if !sequence.is_ordered() {
        warn!("stored records are out of time order, sorting");
        sequence.sort();
    }
    Ok((schema, sequence))
}

fn detect(record: &Value) -> Option<Schema> {
    let object = record.as_object()?;
    if object.contains_key("eventType") {
        return Some(Schema::Flat);
    }
    match object.values().next() {
        Some(Value::Array(_)) if object.len() == 1 => Some(Schema::Tagged),
        _ => None,
    }
}

/// Event types either layout can name
const EVENT_NAMES: &[&str] = &[
    "mouse_move",
    "mouse_click",
    "mouse_scroll",
    "keyboard_key_pressed",
    "keyboard_key_released",
    "keyboard_key_press",
    "keyboard_key_release",
];

/// Event type of a record whose envelope fits `schema`
fn event_name(record: &Value, schema: Schema) -> Option<&str> {
    let object = record.as_object()?;
    match schema {
        Schema::Flat if object.contains_key("time") => object.get("eventType")?.as_str(),
        Schema::Flat => None,
        Schema::Tagged => match object.iter().next() {
            Some((name, Value::Array(_))) if object.len() == 1 => Some(name.as_str()),
            _ => None,
        },
    }
}

// ============================================================================
// Record layouts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Coordinate {
    #[serde(deserialize_with = "round_coordinate")]
    x: i32,
    #[serde(deserialize_with = "round_coordinate")]
    y: i32,
}

// Some recorders store sub-pixel positions.
fn round_coordinate<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    let rounded = value.round();
    if !(rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX)) {
        return Err(de::Error::custom(format!("coordinate {value} out of range")));
    }
    Ok(rounded as i32)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ScrollVector {
    dx: i32,
    dy: i32,
}

fn pressed_default() -> bool {
    true
}

fn released_default() -> bool {
    false
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
enum FlatRecord {
    MouseMove {
        coordinate: Coordinate,
        time: f64,
    },
    MouseClick {
        coordinate: Coordinate,
        button: ButtonId,
        pressed: bool,
        time: f64,
    },
    MouseScroll {
        coordinate: Coordinate,
        scroll_vector: ScrollVector,
        time: f64,
    },
    #[serde(alias = "keyboard_key_press")]
    KeyboardKeyPressed {
        key: KeyId,
        #[serde(default = "pressed_default")]
        pressed: bool,
        time: f64,
    },
    #[serde(alias = "keyboard_key_release")]
    KeyboardKeyReleased {
        key: KeyId,
        #[serde(default = "released_default")]
        pressed: bool,
        time: f64,
    },
}

impl From<&Event> for FlatRecord {
    fn from(event: &Event) -> Self {
        let time = event.timestamp;
        match &event.kind {
            EventKind::MouseMove { x, y } => FlatRecord::MouseMove {
                coordinate: Coordinate { x: *x, y: *y },
                time,
            },
            EventKind::MouseClick {
                x,
                y,
                button,
                pressed,
            } => FlatRecord::MouseClick {
                coordinate: Coordinate { x: *x, y: *y },
                button: button.clone(),
                pressed: *pressed,
                time,
            },
            EventKind::MouseScroll { x, y, dx, dy } => FlatRecord::MouseScroll {
                coordinate: Coordinate { x: *x, y: *y },
                scroll_vector: ScrollVector { dx: *dx, dy: *dy },
                time,
            },
            EventKind::KeyPress { key } => FlatRecord::KeyboardKeyPressed {
                key: key.clone(),
                pressed: true,
                time,
            },
            EventKind::KeyRelease { key } => FlatRecord::KeyboardKeyReleased {
                key: key.clone(),
                pressed: false,
                time,
            },
        }
    }
}

// The record type decides press or release; a contradicting `pressed` flag
// is ignored.
impl From<FlatRecord> for Event {
    fn from(record: FlatRecord) -> Self {
        match record {
            FlatRecord::MouseMove { coordinate, time } => Event::new(
                time,
                EventKind::MouseMove {
                    x: coordinate.x,
                    y: coordinate.y,
                },
            ),
            FlatRecord::MouseClick {
                coordinate,
                button,
                pressed,
                time,
            } => Event::new(
                time,
                EventKind::MouseClick {
                    x: coordinate.x,
                    y: coordinate.y,
                    button,
                    pressed,
                },
            ),
            FlatRecord::MouseScroll {
                coordinate,
                scroll_vector,
                time,
            } => Event::new(
                time,
                EventKind::MouseScroll {
                    x: coordinate.x,
                    y: coordinate.y,
                    dx: scroll_vector.dx,
                    dy: scroll_vector.dy,
                },
            ),
            FlatRecord::KeyboardKeyPressed { key, time, .. } => {
                Event::new(time, EventKind::KeyPress { key })
            }
            FlatRecord::KeyboardKeyReleased { key, time, .. } => {
                Event::new(time, EventKind::KeyRelease { key })
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Timing {
    #[serde(alias = "seconds")]
    time: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct MoveArgs {
    coordinates: Coordinate,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClickArgs {
    coordinates: Coordinate,
    button: ButtonId,
    pressed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScrollArgs {
    coordinates: Coordinate,
    scroll_vector: ScrollVector,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyArgs {
    key: KeyId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedRecord {
    MouseMove(MoveArgs, Timing),
    MouseClick(ClickArgs, Timing),
    MouseScroll(ScrollArgs, Timing),
    #[serde(alias = "keyboard_key_pressed")]
    KeyboardKeyPress(KeyArgs, Timing),
    #[serde(alias = "keyboard_key_released")]
    KeyboardKeyRelease(KeyArgs, Timing),
}

impl From<&Event> for TaggedRecord {
    fn from(event: &Event) -> Self {
        let timing = Timing {
            time: event.timestamp,
        };
        match &event.kind {
            EventKind::MouseMove { x, y } => TaggedRecord::MouseMove(
                MoveArgs {
                    coordinates: Coordinate { x: *x, y: *y },
                },
                timing,
            ),
            EventKind::MouseClick {
                x,
                y,
                button,
                pressed,
            } => TaggedRecord::MouseClick(
                ClickArgs {
                    coordinates: Coordinate { x: *x, y: *y },
                    button: button.clone(),
                    pressed: *pressed,
                },
                timing,
            ),
            EventKind::MouseScroll { x, y, dx, dy } => TaggedRecord::MouseScroll(
                ScrollArgs {
                    coordinates: Coordinate { x: *x, y: *y },
                    scroll_vector: ScrollVector { dx: *dx, dy: *dy },
                },
                timing,
            ),
            EventKind::KeyPress { key } => {
                TaggedRecord::KeyboardKeyPress(KeyArgs { key: key.clone() }, timing)
            }
            EventKind::KeyRelease { key } => {
                TaggedRecord::KeyboardKeyRelease(KeyArgs { key: key.clone() }, timing)
            }
        }
    }
}

impl From<TaggedRecord> for Event {
    fn from(record: TaggedRecord) -> Self {
        match record {
            TaggedRecord::MouseMove(args, timing) => Event::new(
                timing.time,
                EventKind::MouseMove {
                    x: args.coordinates.x,
                    y: args.coordinates.y,
                },
            ),
            TaggedRecord::MouseClick(args, timing) => Event::new(
                timing.time,
                EventKind::MouseClick {
                    x: args.coordinates.x,
                    y: args.coordinates.y,
                    button: args.button,
                    pressed: args.pressed,
                },
            ),
            TaggedRecord::MouseScroll(args, timing) => Event::new(
                timing.time,
                EventKind::MouseScroll {
                    x: args.coordinates.x,
                    y: args.coordinates.y,
                    dx: args.scroll_vector.dx,
                    dy: args.scroll_vector.dy,
                },
            ),
            TaggedRecord::KeyboardKeyPress(args, timing) => {
                Event::new(timing.time, EventKind::KeyPress { key: args.key })
            }
            TaggedRecord::KeyboardKeyRelease(args, timing) => {
                Event::new(timing.time, EventKind::KeyRelease { key: args.key })
            }
        }
    }
}
