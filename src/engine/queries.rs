use chrono::NaiveDate;

use crate::model::*;
use crate::slots::{now_line_offset, now_ms};
use crate::view::{build_day_view, therapist_columns};

use super::Engine;

impl Engine {
    /// Snapshot of the day's appointments, sorted by start.
    pub async fn appointments_on(&self, date: NaiveDate) -> Vec<Appointment> {
        match self.get_day(&date) {
            Some(day) => day.read().await.appointments.clone(),
            None => Vec::new(),
        }
    }

    pub async fn get_appointment(&self, id: &str) -> Option<Appointment> {
        let date = self.get_day_for_entity(id)?;
        let day = self.get_day(&date)?;
        let guard = day.read().await;
        guard.appointments.iter().find(|a| a.id == id).cloned()
    }

    /// The positioned day view. Recomputed from scratch on every call.
    pub async fn day_view(&self, date: NaiveDate) -> DayView {
        let appointments = self.appointments_on(date).await;
        let mut view = build_day_view(date, &appointments, self.roster(), self.grid());
        view.now_line_min = now_line_offset(now_ms(), date, self.grid());
        metrics::histogram!(crate::observability::DAY_VIEW_EVENTS).record(view.events.len() as f64);
        view
    }

    pub async fn therapists(&self, date: NaiveDate) -> Vec<String> {
        let appointments = self.appointments_on(date).await;
        therapist_columns(&appointments, self.roster())
    }

    pub fn slots(&self, date: NaiveDate) -> Vec<TimeSlot> {
        self.grid().slots_for(date)
    }

    /// Appointments with no room, in start order.
    pub async fn unassigned(&self, date: NaiveDate) -> Vec<Appointment> {
        let mut appointments = self.appointments_on(date).await;
        appointments.retain(|a| !a.room.is_assigned());
        appointments
    }

    pub fn status(&self) -> StatusInfo {
        StatusInfo {
            days: self.day_count(),
            appointments: self.appointment_count(),
            roster: self.roster().len(),
        }
    }
}
