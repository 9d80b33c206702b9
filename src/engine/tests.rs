use super::*;
use crate::limits::{MAX_APPOINTMENTS_PER_DAY, MAX_BATCH_SIZE};
use crate::room::Room;

const M: Ms = 60_000; // 1 minute in ms

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()
}

fn at(h: u32, m: u32) -> Ms {
    to_ms(date().and_hms_opt(h, m, 0).unwrap())
}

fn booking(id: &str, therapist: &str, start: Ms, end: Ms) -> Appointment {
    let mut appt = Appointment::new(id, therapist, start, end);
    appt.customer = "Brian".into();
    appt.service = "Swedish Massage".into();
    appt
}

#[tokio::test]
async fn upsert_and_query_day() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    engine.upsert_appointment(booking("b2", "Katy", at(10, 30), at(11, 30))).await.unwrap();
    engine.upsert_appointment(booking("b3", "May", at(9, 0), at(9, 45))).await.unwrap();

    assert_eq!(engine.appointment_count(), 3);
    assert_eq!(engine.get_day_for_entity("b1"), Some(date()));

    let view = engine.day_view(date()).await;
    assert_eq!(view.therapists, vec!["Katy", "May"]);
    let ids: Vec<&str> = view.events.iter().map(|e| e.appointment.id.as_str()).collect();
    assert_eq!(ids, vec!["b3", "b1", "b2"]);

    let b1 = &view.events[1];
    assert_eq!(b1.position, Position { left: 0.0, width: 50.0 });
    assert_eq!(b1.placement.map(|p| (p.slot_index, p.end_slot_index)), Some((4, 7)));
    assert_eq!(view.events[0].position, Position::FULL);
}

#[tokio::test]
async fn upsert_replaces_same_id() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    engine.upsert_appointment(booking("b1", "Katy", at(12, 0), at(13, 0))).await.unwrap();

    let appts = engine.appointments_on(date()).await;
    assert_eq!(appts.len(), 1);
    assert_eq!(appts[0].start, at(12, 0));
}

#[tokio::test]
async fn upsert_moves_between_days() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    let next = date().succ_opt().unwrap();
    let next_start = to_ms(next.and_hms_opt(10, 0, 0).unwrap());
    engine
        .upsert_appointment(booking("b1", "Katy", next_start, next_start + 60 * M))
        .await
        .unwrap();

    assert!(engine.appointments_on(date()).await.is_empty());
    assert_eq!(engine.appointments_on(next).await.len(), 1);
    assert_eq!(engine.get_day_for_entity("b1"), Some(next));
    assert_eq!(engine.appointment_count(), 1);
}

#[tokio::test]
async fn degenerate_appointment_is_stored_and_laid_out() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("ok", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    engine.upsert_appointment(booking("zero", "Katy", at(10, 15), at(10, 15))).await.unwrap();
    engine.upsert_appointment(booking("back", "Katy", at(10, 40), at(10, 20))).await.unwrap();

    let view = engine.day_view(date()).await;
    assert_eq!(view.events.len(), 3);
    let position = |id: &str| {
        view.events
            .iter()
            .find(|e| e.appointment.id == id)
            .map(|e| e.position)
    };
    assert_eq!(position("ok"), Some(Position { left: 0.0, width: 50.0 }));
    assert_eq!(position("zero"), Some(Position { left: 50.0, width: 50.0 }));
    assert_eq!(position("back"), Some(Position::FULL));
}

#[tokio::test]
async fn invalid_appointment_rejected() {
    let engine = Engine::default();
    let result = engine.upsert_appointment(booking("", "Katy", at(10, 0), at(11, 0))).await;
    assert_eq!(result, Err(EngineError::LimitExceeded("empty appointment id")));
    assert_eq!(engine.appointment_count(), 0);
}

#[tokio::test]
async fn batch_upsert_counts() {
    let engine = Engine::default();
    let n = engine
        .upsert_appointments(vec![
            booking("a", "Katy", at(9, 0), at(10, 0)),
            booking("b", "May", at(9, 0), at(10, 0)),
        ])
        .await
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(engine.status().appointments, 2);
}

#[tokio::test]
async fn batch_with_invalid_row_writes_nothing() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("kept", "Katy", at(9, 0), at(10, 0))).await.unwrap();

    let result = engine
        .upsert_appointments(vec![
            booking("kept", "Katy", at(15, 0), at(16, 0)),
            booking("new", "May", at(9, 0), at(10, 0)),
            booking("", "May", at(11, 0), at(12, 0)),
        ])
        .await;
    assert_eq!(result, Err(EngineError::LimitExceeded("empty appointment id")));

    assert_eq!(engine.appointment_count(), 1);
    assert!(engine.get_appointment("new").await.is_none());
    assert_eq!(engine.get_appointment("kept").await.unwrap().start, at(9, 0));
}

#[tokio::test]
async fn batch_too_large_rejected() {
    let engine = Engine::default();
    let rows: Vec<Appointment> = (0..=MAX_BATCH_SIZE)
        .map(|i| booking(&format!("b{i}"), "Katy", at(9, 0), at(10, 0)))
        .collect();
    let result = engine.upsert_appointments(rows).await;
    assert_eq!(result, Err(EngineError::LimitExceeded("batch too large")));
    assert_eq!(engine.appointment_count(), 0);
    assert_eq!(engine.day_count(), 0);
}

#[tokio::test]
async fn later_row_with_same_id_wins() {
    let engine = Engine::default();
    let next = date().succ_opt().unwrap();
    let next_start = to_ms(next.and_hms_opt(9, 0, 0).unwrap());
    let n = engine
        .upsert_appointments(vec![
            booking("b1", "Katy", at(9, 0), at(10, 0)),
            booking("b1", "Katy", next_start, next_start + 60 * M),
        ])
        .await
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(engine.appointment_count(), 1);
    assert_eq!(engine.get_day_for_entity("b1"), Some(next));
    assert!(engine.appointments_on(date()).await.is_empty());
}

#[tokio::test]
async fn move_into_full_day_leaves_record_in_place() {
    let engine = Engine::default();
    let full = date().succ_opt().unwrap();
    let full_start = to_ms(full.and_hms_opt(9, 0, 0).unwrap());
    for chunk in 0..MAX_APPOINTMENTS_PER_DAY / MAX_BATCH_SIZE {
        let rows = (0..MAX_BATCH_SIZE)
            .map(|i| {
                let id = format!("f{}", chunk * MAX_BATCH_SIZE + i);
                booking(&id, "May", full_start, full_start + 30 * M)
            })
            .collect();
        engine.upsert_appointments(rows).await.unwrap();
    }
    engine.upsert_appointment(booking("x", "Katy", at(9, 0), at(10, 0))).await.unwrap();

    let result = engine
        .upsert_appointment(booking("x", "Katy", full_start, full_start + 60 * M))
        .await;
    assert_eq!(result, Err(EngineError::LimitExceeded("too many appointments on day")));

    assert_eq!(engine.get_day_for_entity("x"), Some(date()));
    assert_eq!(engine.get_appointment("x").await.unwrap().start, at(9, 0));
    assert_eq!(engine.status().appointments, MAX_APPOINTMENTS_PER_DAY + 1);
    engine.update_room("x", Room::Numbered(2), date()).await.unwrap();

    // Replacing a record already on the full day is still allowed.
    engine
        .upsert_appointment(booking("f0", "May", full_start, full_start + 45 * M))
        .await
        .unwrap();
}

#[tokio::test]
async fn update_room_sets_room_and_clears_reason() {
    let engine = Engine::default();
    let mut appt = booking("b1", "Katy", at(10, 0), at(11, 0));
    appt.reason = Some("No room available".into());
    engine.upsert_appointment(appt).await.unwrap();

    assert_eq!(engine.unassigned(date()).await.len(), 1);

    engine.update_room("b1", Room::Numbered(5), date()).await.unwrap();
    let stored = engine.get_appointment("b1").await.unwrap();
    assert_eq!(stored.room, Room::Numbered(5));
    assert_eq!(stored.reason, None);
    assert!(engine.unassigned(date()).await.is_empty());

    // Back to unassigned is a valid manager choice.
    engine.update_room("b1", Room::Unassigned, date()).await.unwrap();
    assert_eq!(engine.unassigned(date()).await.len(), 1);
}

#[tokio::test]
async fn update_room_unknown_id() {
    let engine = Engine::default();
    let result = engine.update_room("nope", Room::Numbered(1), date()).await;
    assert_eq!(result, Err(EngineError::NotFound("nope".into())));
}

#[tokio::test]
async fn update_room_wrong_date() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    let other = date().succ_opt().unwrap();
    let result = engine.update_room("b1", Room::Merged02, other).await;
    assert_eq!(
        result,
        Err(EngineError::DateMismatch {
            id: "b1".into(),
            stored: date(),
            requested: other,
        })
    );
    let stored = engine.get_appointment("b1").await.unwrap();
    assert_eq!(stored.room, Room::Unassigned);
}

#[tokio::test]
async fn room_edit_then_reload_shows_new_room() {
    // The dashboard writes, then reloads the whole day.
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();

    let mut cell = crate::room::RoomCell::new(Room::Unassigned);
    cell.begin_edit();
    cell.input("Rm 3");
    let crate::room::CommitOutcome::Save(room) = cell.commit() else {
        panic!("expected a save");
    };
    engine.update_room("b1", room, date()).await.unwrap();
    cell.save_succeeded();

    let view = engine.day_view(date()).await;
    assert_eq!(view.events[0].appointment.room, Room::Numbered(3));
    assert_eq!(cell.shown_room(), Room::Numbered(3));
}

#[tokio::test]
async fn cancel_removes_appointment() {
    let engine = Engine::default();
    engine.upsert_appointment(booking("b1", "Katy", at(10, 0), at(11, 0))).await.unwrap();
    assert_eq!(engine.cancel_appointment("b1").await, Ok(date()));
    assert!(engine.appointments_on(date()).await.is_empty());
    assert_eq!(engine.get_day_for_entity("b1"), None);
    assert_eq!(
        engine.cancel_appointment("b1").await,
        Err(EngineError::NotFound("b1".into()))
    );
}

#[tokio::test]
async fn roster_shown_on_empty_day() {
    let engine = Engine::new(GridConfig::default(), vec!["Katy M".into(), "May L".into()]);
    let view = engine.day_view(date()).await;
    assert!(view.events.is_empty());
    assert_eq!(view.therapists, vec!["Katy M", "May L"]);
    assert_eq!(engine.therapists(date()).await, view.therapists);
    assert_eq!(engine.status().roster, 2);
}

#[tokio::test]
async fn slots_follow_grid() {
    let grid = GridConfig {
        start_hour: 10,
        end_hour: 12,
        slot_minutes: 30,
        slot_height_px: 30,
    };
    let engine = Engine::new(grid, Vec::new());
    let slots = engine.slots(date());
    assert_eq!(slots.len(), 5);
    assert_eq!(slots[0].start, at(10, 0));
    assert_eq!(slots[4].start, at(12, 0));
}

#[tokio::test]
async fn day_view_is_stable_across_calls() {
    let engine = Engine::default();
    for (i, (s, e)) in [(0, 30), (15, 45), (40, 60), (90, 120)].into_iter().enumerate() {
        engine
            .upsert_appointment(booking(&format!("b{i}"), "Katy", at(9, 0) + s * M, at(9, 0) + e * M))
            .await
            .unwrap();
    }
    let first = engine.day_view(date()).await;
    let second = engine.day_view(date()).await;
    assert_eq!(first, second);
    let widths: Vec<f64> = first.events.iter().map(|e| e.position.width).collect();
    assert_eq!(widths[3], 100.0);
    assert!((widths[0] - 100.0 / 3.0).abs() < 1e-9);
}
