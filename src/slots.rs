use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::*;

/// Shape of the day grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub start_hour: u32,
    /// Last hour drawn; its `:00` slot is included.
    pub end_hour: u32,
    pub slot_minutes: u32,
    pub slot_height_px: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 23,
            slot_minutes: 15,
            slot_height_px: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    HourRange { start_hour: u32, end_hour: u32 },
    SlotMinutes(u32),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::HourRange { start_hour, end_hour } => write!(
                f,
                "grid hours must satisfy start < end <= 23, got {start_hour}..={end_hour}"
            ),
            GridError::SlotMinutes(m) => {
                write!(f, "slot length must divide an hour, got {m} minutes")
            }
        }
    }
}

impl std::error::Error for GridError {}

impl GridConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.start_hour >= self.end_hour || self.end_hour > 23 {
            return Err(GridError::HourRange {
                start_hour: self.start_hour,
                end_hour: self.end_hour,
            });
        }
        if self.slot_minutes == 0 || 60 % self.slot_minutes != 0 {
            return Err(GridError::SlotMinutes(self.slot_minutes));
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        ((self.end_hour - self.start_hour) * 60 / self.slot_minutes) as usize + 1
    }

    pub fn slots_for(&self, date: NaiveDate) -> Vec<TimeSlot> {
        generate_slots(date, self.start_hour, self.end_hour, self.slot_minutes)
    }
}

// ── Dates ────────────────────────────────────────────────────────

/// Parse a strict `YYYY-MM-DD` date, falling back to `fallback`.
pub fn parse_day_or(text: &str, fallback: NaiveDate) -> NaiveDate {
    let t = text.trim();
    let well_formed = t.len() == 10
        && t.bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    match well_formed
        .then(|| NaiveDate::parse_from_str(t, "%Y-%m-%d").ok())
        .flatten()
    {
        Some(date) => date,
        None => {
            warn!("malformed date {text:?}, using {fallback}");
            fallback
        }
    }
}

/// Parse a `YYYY-MM-DD` date, falling back to today's local date.
pub fn parse_day(text: &str) -> NaiveDate {
    parse_day_or(text, today())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The current local wall-clock instant.
pub fn now_ms() -> Ms {
    to_ms(Local::now().naive_local())
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(hour, 0, 0)
}

// ── Slots ────────────────────────────────────────────────────────

/// Fixed-width slots from `start_hour:00` through `end_hour_inclusive:00`.
///
/// The slot at the end hour is included so blocks ending exactly at the
/// close of the day still find an end slot. Returns an empty sequence for
/// an inverted window or a zero slot length.
pub fn generate_slots(
    date: NaiveDate,
    start_hour: u32,
    end_hour_inclusive: u32,
    slot_minutes: u32,
) -> Vec<TimeSlot> {
    let (Some(first), Some(last)) = (at_hour(date, start_hour), at_hour(date, end_hour_inclusive))
    else {
        return Vec::new();
    };
    if slot_minutes == 0 {
        return Vec::new();
    }
    let step = slot_minutes as Ms * MINUTE_MS;
    let (first, last) = (to_ms(first), to_ms(last));

    let mut slots = Vec::new();
    let mut current = first;
    while current <= last {
        slots.push(TimeSlot {
            start: current,
            minutes: slot_minutes,
        });
        current += step;
    }
    slots
}

/// Indices of the slots an appointment starts and ends in.
///
/// The start slot is the one whose half-open window holds `start`. The end
/// slot is the first slot, from the start slot on, whose window closes at
/// or after `end`. An appointment running past the grid ends in the last
/// slot, not in its start slot; only `end_slot_index` sees the difference.
/// `None` when `start` is outside the grid.
pub fn find_spanning_slots(start: Ms, end: Ms, slots: &[TimeSlot]) -> Option<(usize, usize)> {
    let first = slots.partition_point(|s| s.end() <= start);
    if first >= slots.len() || !slots[first].contains(start) {
        return None;
    }
    let last = slots[first..]
        .iter()
        .position(|s| end <= s.end())
        .map_or(slots.len() - 1, |offset| first + offset);
    Some((first, last))
}

/// Vertical placement of an appointment block on the grid.
pub fn place_block(appt: &Appointment, slots: &[TimeSlot], grid: &GridConfig) -> Option<BlockPlacement> {
    let (slot_index, end_slot_index) = find_spanning_slots(appt.start, appt.end, slots)?;
    let slot_ms = grid.slot_minutes as f64 * MINUTE_MS as f64;
    let offset_ms = (appt.start - slots[slot_index].start) as f64;
    let duration_ms = (appt.end - appt.start).max(0) as f64;
    Some(BlockPlacement {
        slot_index,
        end_slot_index,
        top_percent: offset_ms / slot_ms * 100.0,
        height_px: duration_ms / slot_ms * grid.slot_height_px as f64,
    })
}

/// Minutes from the top of the grid to `now`, for the current-time line.
///
/// `None` unless `now` falls on `date` within `[start_hour, end_hour)`.
pub fn now_line_offset(now: Ms, date: NaiveDate, grid: &GridConfig) -> Option<f64> {
    let start = to_ms(at_hour(date, grid.start_hour)?);
    let end = to_ms(at_hour(date, grid.end_hour)?);
    (start <= now && now < end).then(|| (now - start) as f64 / MINUTE_MS as f64)
}
