use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::*;

// ── Overlap layout ───────────────────────────────────────────────

/// Order used everywhere in layout: start, then end, then id.
///
/// Ties are broken on values, never on input order, so the same set of
/// appointments always lays out the same way.
fn layout_order(a: &Appointment, b: &Appointment) -> Ordering {
    a.start
        .cmp(&b.start)
        .then(a.end.cmp(&b.end))
        .then_with(|| a.id.cmp(&b.id))
}

/// Partition one resource's appointments into overlap groups.
///
/// A group is a connected component of the "overlaps" relation: chains
/// count, so A–B–C form one group even when A and C are disjoint.
/// A zero-length appointment joins the group of an interval strictly
/// containing its instant and otherwise stands alone; a negative one always
/// stands alone. Neither extends a group. Groups and their members are in
/// layout order.
pub fn overlap_groups(appointments: &[Appointment]) -> Vec<Vec<&Appointment>> {
    let mut sorted: Vec<&Appointment> = appointments.iter().collect();
    sorted.sort_by(|a, b| layout_order(a, b));

    let mut groups: Vec<Vec<&Appointment>> = Vec::new();
    // The group still accepting members and the furthest end it reaches.
    let mut open: Option<(usize, Ms)> = None;

    for appt in sorted {
        if appt.is_degenerate() {
            // Every interval already swept starts before this instant.
            match open {
                Some((index, reach)) if appt.is_instant() && appt.start < reach => {
                    groups[index].push(appt);
                }
                _ => groups.push(vec![appt]),
            }
            continue;
        }
        // Sorted by start, so an interval overlaps something in the open
        // group iff it starts before the group's furthest end.
        match open {
            Some((index, reach)) if appt.start < reach => {
                groups[index].push(appt);
                open = Some((index, reach.max(appt.end)));
            }
            _ => {
                groups.push(vec![appt]);
                open = Some((groups.len() - 1, appt.end));
            }
        }
    }

    groups
}

/// Assign every appointment a horizontal lane.
///
/// Singletons get the full width. A group of `k` appointments is split into
/// `k` equal lanes in start order, whether or not every member overlaps
/// every other one.
pub fn compute_positions(appointments: &[Appointment]) -> BTreeMap<String, Position> {
    let mut positions = BTreeMap::new();

    for (group_index, group) in overlap_groups(appointments).into_iter().enumerate() {
        if group.len() == 1 {
            positions.insert(group[0].id.clone(), Position::FULL);
            continue;
        }
        let width = 100.0 / group.len() as f64;
        for (i, appt) in group.iter().enumerate() {
            positions.insert(
                appt.id.clone(),
                Position {
                    left: i as f64 * width,
                    width,
                },
            );
        }
        tracing::debug!(
            group = group_index,
            members = group.len(),
            "overlap group laid out in {} lanes",
            group.len()
        );
    }

    positions
}
