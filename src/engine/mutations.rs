use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::room::Room;

use super::validate::validate_appointment;
use super::{Engine, EngineError};

impl Engine {
    /// Insert an appointment, replacing any earlier record with the same id.
    ///
    /// A replaced record is moved if its day changed.
    pub async fn upsert_appointment(&self, appt: Appointment) -> Result<(), EngineError> {
        self.upsert_appointments(vec![appt]).await.map(|_| ())
    }

    /// Insert many appointments. All-or-nothing: every row and every limit
    /// is checked before anything is written.
    ///
    /// A later row with the same id replaces an earlier one.
    pub async fn upsert_appointments(&self, appts: Vec<Appointment>) -> Result<usize, EngineError> {
        if appts.is_empty() {
            return Ok(0);
        }
        if appts.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }

        let mut targets = Vec::with_capacity(appts.len());
        for appt in &appts {
            validate_appointment(appt)?;
            let date =
                day_of(appt.start).ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
            targets.push(date);
        }

        // Where each id ends up once the batch is applied.
        let mut final_day: HashMap<String, NaiveDate> = HashMap::new();
        for (appt, date) in appts.iter().zip(&targets) {
            final_day.insert(appt.id.clone(), *date);
        }

        let mut new_days: Vec<NaiveDate> = targets
            .iter()
            .copied()
            .filter(|d| !self.days.contains_key(d))
            .collect();
        new_days.sort();
        new_days.dedup();
        if self.days.len() + new_days.len() > MAX_DAYS {
            return Err(EngineError::LimitExceeded("too many days"));
        }

        // Every day touched: targets and the days records move away from.
        let mut touched: Vec<NaiveDate> = targets.clone();
        touched.extend(final_day.keys().filter_map(|id| self.get_day_for_entity(id)));
        touched.sort();
        touched.dedup();

        // Existing days are checked before any new day is created.
        for date in &touched {
            if let Some(day) = self.get_day(date) {
                let guard = day.read().await;
                self.check_day_capacity(&guard, &final_day)?;
            }
        }

        // Write locks in date order so concurrent batches cannot deadlock.
        let mut guards: BTreeMap<NaiveDate, OwnedRwLockWriteGuard<DayState>> = BTreeMap::new();
        for date in touched {
            let guard = self.day_or_insert(date).write_owned().await;
            self.check_day_capacity(&guard, &final_day)?;
            guards.insert(date, guard);
        }

        let count = appts.len();
        for (appt, date) in appts.into_iter().zip(targets) {
            if appt.is_degenerate() {
                warn!(
                    id = %appt.id,
                    start = appt.start,
                    end = appt.end,
                    "appointment does not end after it starts"
                );
            }
            if let Some(previous) = self.get_day_for_entity(&appt.id)
                && previous != date
                && let Some(guard) = guards.get_mut(&previous)
            {
                guard.remove_appointment(&appt.id);
            }
            if let Some(guard) = guards.get_mut(&date) {
                guard.remove_appointment(&appt.id);
                self.entity_to_day.insert(appt.id.clone(), date);
                guard.insert_appointment(appt);
                metrics::counter!(crate::observability::APPOINTMENTS_UPSERTED_TOTAL).increment(1);
            }
        }
        Ok(count)
    }

    /// Manager room edit. The manager's choice always stands; no conflict
    /// checking happens here.
    pub async fn update_room(&self, id: &str, room: Room, date: NaiveDate) -> Result<(), EngineError> {
        let stored = self
            .get_day_for_entity(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if stored != date {
            return Err(EngineError::DateMismatch {
                id: id.to_string(),
                stored,
                requested: date,
            });
        }
        let day = self
            .get_day(&stored)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let mut guard = day.write().await;
        let appt = guard
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let old = appt.room;
        appt.room = room;
        appt.reason = None;
        info!("room for {id} on {date}: {old} -> {room}");
        metrics::counter!(crate::observability::ROOM_UPDATES_TOTAL).increment(1);
        Ok(())
    }

    /// Remove an appointment. Returns the day it was on.
    pub async fn cancel_appointment(&self, id: &str) -> Result<NaiveDate, EngineError> {
        let (_, date) = self
            .entity_to_day
            .remove(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        // Emptied days stay in the map; a concurrent upsert may already hold them.
        if let Some(day) = self.get_day(&date) {
            day.write().await.remove_appointment(id);
        }
        info!("cancelled {id} on {date}");
        Ok(date)
    }

    /// Fails if applying the batch would push `day` past its appointment cap.
    fn check_day_capacity(
        &self,
        day: &DayState,
        final_day: &HashMap<String, NaiveDate>,
    ) -> Result<(), EngineError> {
        let mut leaving = 0;
        let mut arriving = 0;
        for (id, target) in final_day {
            let here = self.get_day_for_entity(id) == Some(day.date);
            if here && *target != day.date {
                leaving += 1;
            } else if !here && *target == day.date {
                arriving += 1;
            }
        }
        if day.appointments.len().saturating_sub(leaving) + arriving > MAX_APPOINTMENTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many appointments on day"));
        }
        Ok(())
    }
}
