use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A treatment room.
///
/// Rooms 0 and 2 can be merged into `02D` for couple treatments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Room {
    Numbered(u8),
    Merged02,
    #[default]
    Unassigned,
}

impl Room {
    pub const HIGHEST: u8 = 6;

    /// Every room a booking can be put in, in display order.
    pub fn all() -> Vec<Room> {
        let mut rooms: Vec<Room> = (0..=Self::HIGHEST).map(Room::Numbered).collect();
        rooms.push(Room::Merged02);
        rooms.push(Room::Unassigned);
        rooms
    }

    pub fn is_assigned(&self) -> bool {
        !matches!(self, Room::Unassigned)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Numbered(n) => write!(f, "{n}"),
            Room::Merged02 => f.write_str("02D"),
            Room::Unassigned => f.write_str("UNASSIGNED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    Invalid(String),
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::Invalid(s) => write!(
                f,
                "invalid room number: {s:?}; valid rooms: 0, 1, 2, 3, 4, 5, 6, 02D, UNASSIGNED"
            ),
        }
    }
}

impl std::error::Error for RoomError {}

impl FromStr for Room {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("02D") {
            return Ok(Room::Merged02);
        }
        if t.eq_ignore_ascii_case("UNASSIGNED") {
            return Ok(Room::Unassigned);
        }
        match t.parse::<u8>() {
            Ok(n) if n <= Self::HIGHEST && t.len() == 1 => Ok(Room::Numbered(n)),
            _ => Err(RoomError::Invalid(t.to_string())),
        }
    }
}

impl Serialize for Room {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Clean up what a manager typed into the room field.
///
/// Strips a leading `Rm ` / `Room `, canonicalises `02d` and `unassigned`,
/// and otherwise keeps only the digits. The result may be empty.
pub fn normalize_room_input(raw: &str) -> String {
    let mut text = raw.trim();
    for prefix in ["rm ", "room "] {
        if let Some(head) = text.get(..prefix.len())
            && head.eq_ignore_ascii_case(prefix)
        {
            text = text[prefix.len()..].trim();
        }
    }
    if text.eq_ignore_ascii_case("02D") {
        return "02D".into();
    }
    if text.eq_ignore_ascii_case("UNASSIGNED") {
        return "UNASSIGNED".into();
    }
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ── Inline edit state machine ────────────────────────────────────

/// State of one editable room cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCell {
    Display { room: Room },
    Editing { original: Room, pending: String },
    Saving { original: Room, room: Room },
    Error { original: Room, message: String },
}

/// What the caller must do after [`RoomCell::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing to save; the cell is back in `Display`.
    Unchanged,
    /// Input was not a room; the cell stays in `Editing` with its input reset.
    Rejected(RoomError),
    /// Send the room to the store, then report back.
    Save(Room),
    /// The cell was not being edited.
    Ignored,
}

/// Text an edit box starts with for `room`.
fn initial_input(room: Room) -> String {
    match room {
        Room::Unassigned => String::new(),
        other => other.to_string(),
    }
}

impl RoomCell {
    pub fn new(room: Room) -> Self {
        RoomCell::Display { room }
    }

    /// The room currently shown (the pre-edit room while editing or saving).
    pub fn shown_room(&self) -> Room {
        match self {
            RoomCell::Display { room } => *room,
            RoomCell::Editing { original, .. }
            | RoomCell::Saving { original, .. }
            | RoomCell::Error { original, .. } => *original,
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self, RoomCell::Display { .. })
    }

    /// Start editing. Returns false if the cell is not in `Display`.
    pub fn begin_edit(&mut self) -> bool {
        let RoomCell::Display { room } = *self else {
            return false;
        };
        *self = RoomCell::Editing {
            original: room,
            pending: initial_input(room),
        };
        true
    }

    pub fn input(&mut self, text: &str) {
        if let RoomCell::Editing { pending, .. } = self {
            *pending = text.to_string();
        }
    }

    pub fn commit(&mut self) -> CommitOutcome {
        let RoomCell::Editing { original, pending } = self else {
            return CommitOutcome::Ignored;
        };
        let original = *original;
        let normalized = normalize_room_input(pending);
        if normalized.is_empty() || normalized == original.to_string() {
            *self = RoomCell::Display { room: original };
            return CommitOutcome::Unchanged;
        }
        match normalized.parse::<Room>() {
            Ok(room) => {
                *self = RoomCell::Saving { original, room };
                CommitOutcome::Save(room)
            }
            Err(e) => {
                *pending = initial_input(original);
                CommitOutcome::Rejected(e)
            }
        }
    }

    pub fn cancel(&mut self) {
        if let RoomCell::Editing { original, .. } = *self {
            *self = RoomCell::Display { room: original };
        }
    }

    pub fn save_succeeded(&mut self) {
        if let RoomCell::Saving { room, .. } = *self {
            *self = RoomCell::Display { room };
        }
    }

    pub fn save_failed(&mut self, message: impl Into<String>) {
        if let RoomCell::Saving { original, .. } = *self {
            *self = RoomCell::Error {
                original,
                message: message.into(),
            };
        }
    }

    pub fn acknowledge(&mut self) {
        if let RoomCell::Error { original, .. } = *self {
            *self = RoomCell::Display { room: original };
        }
    }
}
