use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::room::Room;

/// Wall-clock milliseconds, the only time type.
///
/// Local wall-clock time laid on the Unix-epoch scale; no zone conversion
/// ever happens, so a 09:00 appointment is 09:00 on the grid.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Convert a wall-clock date-time to `Ms`.
pub fn to_ms(dt: NaiveDateTime) -> Ms {
    dt.and_utc().timestamp_millis()
}

/// Convert `Ms` back to a wall-clock date-time. `None` if out of chrono's range.
pub fn from_ms(ms: Ms) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// The calendar day an instant falls on.
pub fn day_of(ms: Ms) -> Option<NaiveDate> {
    from_ms(ms).map(|dt| dt.date())
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// `t` lies inside the span and on neither edge.
    pub fn strictly_contains(&self, t: Ms) -> bool {
        self.start < t && t < self.end
    }
}

/// Single or couple treatment. Only carried through to the view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentKind {
    #[default]
    Single,
    Couple,
}

impl AppointmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Single => "single",
            AppointmentKind::Couple => "couple",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Some(AppointmentKind::Single),
            "couple" => Some(AppointmentKind::Couple),
            _ => None,
        }
    }
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One booking on one resource.
///
/// `start`/`end` are kept raw rather than as a [`Span`] so that degenerate
/// input (`end <= start`) can be represented and laid out without panicking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    /// The resource (therapist) the appointment is scheduled against.
    pub resource: String,
    pub start: Ms,
    pub end: Ms,
    pub customer: String,
    pub service: String,
    pub kind: AppointmentKind,
    pub room: Room,
    /// Why the appointment has no room, if it has none.
    pub reason: Option<String>,
}

impl Appointment {
    pub fn new(id: impl Into<String>, resource: impl Into<String>, start: Ms, end: Ms) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            start,
            end,
            customer: String::new(),
            service: String::new(),
            kind: AppointmentKind::Single,
            room: Room::Unassigned,
            reason: None,
        }
    }

    /// The appointment's interval, or `None` when it is degenerate.
    pub fn span(&self) -> Option<Span> {
        (self.start < self.end).then(|| Span::new(self.start, self.end))
    }

    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    /// Half-open overlap. A zero-length appointment overlaps only an interval
    /// strictly containing its instant; a negative one overlaps nothing.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        match (self.span(), other.span()) {
            (Some(a), Some(b)) => a.overlaps(&b),
            (None, Some(b)) => self.is_instant() && b.strictly_contains(self.start),
            (Some(a), None) => other.is_instant() && a.strictly_contains(other.start),
            (None, None) => false,
        }
    }

    /// Zero duration: `start == end`.
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }
}

/// Horizontal lane assignment, in percent of the resource column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub left: f64,
    pub width: f64,
}

impl Position {
    pub const FULL: Position = Position { left: 0.0, width: 100.0 };
}

/// A fixed-width bucket of the day grid, half-open like [`Span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Ms,
    pub minutes: u32,
}

impl TimeSlot {
    pub fn end(&self) -> Ms {
        self.start + self.minutes as Ms * MINUTE_MS
    }

    pub fn contains(&self, t: Ms) -> bool {
        self.start <= t && t < self.end()
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        from_ms(self.start)
    }
}

/// Where an appointment's block sits vertically in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockPlacement {
    pub slot_index: usize,
    pub end_slot_index: usize,
    /// Offset of the block's top inside its first slot, in percent of a slot.
    pub top_percent: f64,
    pub height_px: f64,
}

/// One calendar day of appointments across all resources.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    /// Sorted by `start`.
    pub appointments: Vec<Appointment>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start.
    pub fn insert_appointment(&mut self, appt: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.start <= appt.start);
        self.appointments.insert(pos, appt);
    }

    pub fn remove_appointment(&mut self, id: &str) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }
}

// ── Query result types ───────────────────────────────────────────

/// An appointment as rendered: its lane and (if on the grid) its block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedEvent {
    #[serde(flatten)]
    pub appointment: Appointment,
    /// Header of the column the event renders in; bookings whose names
    /// differ only in case or spacing share one.
    pub column: String,
    pub position: Position,
    pub placement: Option<BlockPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub therapists: Vec<String>,
    pub events: Vec<PlacedEvent>,
    /// Minutes from the top of the grid to the current-time line, when
    /// the view is of today and now is inside the grid.
    pub now_line_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    pub days: usize,
    pub appointments: usize,
    pub roster: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> Ms {
        to_ms(
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
    }

    #[test]
    fn span_strict_containment() {
        let s = Span::new(100, 200);
        assert!(s.strictly_contains(150));
        assert!(!s.strictly_contains(100));
        assert!(!s.strictly_contains(200));
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn ms_roundtrips_wall_clock() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        assert_eq!(from_ms(to_ms(dt)), Some(dt));
        assert_eq!(day_of(to_ms(dt)), NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn degenerate_appointment_has_no_span() {
        let zero = Appointment::new("a", "Katy", at(9, 0), at(9, 0));
        let negative = Appointment::new("b", "Katy", at(10, 0), at(9, 0));
        assert!(zero.span().is_none());
        assert!(zero.is_degenerate());
        assert!(negative.span().is_none());

        let around = Appointment::new("c", "Katy", at(8, 0), at(11, 0));
        assert!(!around.overlaps(&negative));
        assert!(!negative.overlaps(&around));
    }

    #[test]
    fn zero_length_overlaps_only_when_strictly_inside() {
        let zero = Appointment::new("z", "Katy", at(9, 30), at(9, 30));
        let around = Appointment::new("a", "Katy", at(9, 0), at(10, 0));
        let starts_there = Appointment::new("s", "Katy", at(9, 30), at(10, 0));
        let ends_there = Appointment::new("e", "Katy", at(9, 0), at(9, 30));
        let other_zero = Appointment::new("o", "Katy", at(9, 30), at(9, 30));

        assert!(zero.overlaps(&around));
        assert!(around.overlaps(&zero));
        assert!(!zero.overlaps(&starts_there));
        assert!(!ends_there.overlaps(&zero));
        assert!(!zero.overlaps(&other_zero));
    }

    #[test]
    fn touching_appointments_do_not_overlap() {
        let a = Appointment::new("a", "Katy", at(9, 0), at(9, 30));
        let b = Appointment::new("b", "Katy", at(9, 30), at(10, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn time_slot_is_half_open() {
        let slot = TimeSlot { start: at(9, 15), minutes: 15 };
        assert_eq!(slot.end(), at(9, 30));
        assert!(slot.contains(at(9, 15)));
        assert!(!slot.contains(at(9, 30)));
    }

    #[test]
    fn day_state_keeps_start_order() {
        let mut day = DayState::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        day.insert_appointment(Appointment::new("late", "Katy", at(14, 0), at(15, 0)));
        day.insert_appointment(Appointment::new("early", "May", at(9, 0), at(10, 0)));
        day.insert_appointment(Appointment::new("mid", "Katy", at(11, 0), at(12, 0)));
        day.insert_appointment(Appointment::new("mid2", "May", at(11, 0), at(11, 30)));
        let ids: Vec<&str> = day.appointments.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "mid", "mid2", "late"]);

        assert!(day.remove_appointment("mid").is_some());
        assert!(day.remove_appointment("mid").is_none());
        assert_eq!(day.appointments.len(), 3);

        day.get_mut("late").unwrap().room = Room::Numbered(4);
        assert_eq!(day.appointments[2].room, Room::Numbered(4));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(AppointmentKind::parse("Couple"), Some(AppointmentKind::Couple));
        assert_eq!(AppointmentKind::parse(" single "), Some(AppointmentKind::Single));
        assert_eq!(AppointmentKind::parse("group"), None);
    }

    #[test]
    fn appointment_serializes_kind_lowercase() {
        let mut appt = Appointment::new("a", "Katy", at(9, 0), at(10, 0));
        appt.kind = AppointmentKind::Couple;
        let json = serde_json::to_value(&appt).unwrap();
        assert_eq!(json["kind"], "couple");
        assert_eq!(json["room"], "UNASSIGNED");
    }
}
