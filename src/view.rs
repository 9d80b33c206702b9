use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::layout::compute_positions;
use crate::model::*;
use crate::slots::{place_block, GridConfig};

/// Case- and whitespace-insensitive key for a therapist name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Group appointments by the column they render in, keyed by
/// [`normalize_name`]. The layout engine has no resource concept, so this
/// must happen before it runs.
pub fn partition_by_resource(appointments: &[Appointment]) -> BTreeMap<String, Vec<Appointment>> {
    let mut by_resource: BTreeMap<String, Vec<Appointment>> = BTreeMap::new();
    for appt in appointments {
        by_resource
            .entry(normalize_name(&appt.resource))
            .or_default()
            .push(appt.clone());
    }
    by_resource
}

/// Normalised name → the spelling shown on the column header.
///
/// A booking's spelling of a name wins over the roster's.
fn column_names(appointments: &[Appointment], roster: &[String]) -> BTreeMap<String, String> {
    let mut columns: BTreeMap<String, String> = BTreeMap::new();
    for appt in appointments {
        let key = normalize_name(&appt.resource);
        if key.is_empty() {
            continue;
        }
        columns.entry(key).or_insert_with(|| appt.resource.trim().to_string());
    }
    for name in roster {
        let key = normalize_name(name);
        if key.is_empty() {
            continue;
        }
        columns.entry(key).or_insert_with(|| name.trim().to_string());
    }
    columns
}

/// Resources to show as columns: everyone with a booking that day plus the
/// roster, deduplicated by normalised name and sorted.
pub fn therapist_columns(appointments: &[Appointment], roster: &[String]) -> Vec<String> {
    let mut names: Vec<String> = column_names(appointments, roster).into_values().collect();
    names.sort();
    names
}

/// Lay out a whole day: positions per column, blocks per slot.
pub fn build_day_view(
    date: NaiveDate,
    appointments: &[Appointment],
    roster: &[String],
    grid: &GridConfig,
) -> DayView {
    let slots = grid.slots_for(date);
    let columns = column_names(appointments, roster);
    let mut events = Vec::with_capacity(appointments.len());

    for (key, group) in partition_by_resource(appointments) {
        let column = columns.get(&key).cloned().unwrap_or_default();
        let positions = compute_positions(&group);
        for appt in group {
            let position = positions.get(&appt.id).copied().unwrap_or(Position::FULL);
            let placement = place_block(&appt, &slots, grid);
            if placement.is_none() {
                tracing::debug!(
                    id = %appt.id,
                    column = %column,
                    "appointment starts outside the grid, not placed"
                );
            }
            events.push(PlacedEvent {
                appointment: appt,
                column: column.clone(),
                position,
                placement,
            });
        }
    }

    events.sort_by(|a, b| {
        a.appointment
            .start
            .cmp(&b.appointment.start)
            .then_with(|| a.column.cmp(&b.column))
            .then_with(|| a.appointment.id.cmp(&b.appointment.id))
    });

    let mut therapists: Vec<String> = columns.into_values().collect();
    therapists.sort();

    DayView {
        date,
        therapists,
        events,
        now_line_min: None,
    }
}
