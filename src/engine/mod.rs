mod error;
mod mutations;
mod queries;
mod validate;
#[cfg(test)]
mod tests;

pub use error::EngineError;

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::limits::MAX_ROSTER_LEN;
use crate::model::*;
use crate::slots::GridConfig;

pub type SharedDayState = Arc<RwLock<DayState>>;

/// In-memory appointment store, one [`DayState`] per calendar day.
///
/// Nothing is persisted: the feeder reloads appointments after a restart.
pub struct Engine {
    pub days: DashMap<NaiveDate, SharedDayState>,
    /// Reverse lookup: appointment id → day it is stored under.
    entity_to_day: DashMap<String, NaiveDate>,
    /// Therapists shown even on days they have no bookings.
    roster: Vec<String>,
    grid: GridConfig,
}

impl Engine {
    pub fn new(grid: GridConfig, mut roster: Vec<String>) -> Self {
        if roster.len() > MAX_ROSTER_LEN {
            tracing::warn!("roster has {} names, keeping the first {MAX_ROSTER_LEN}", roster.len());
            roster.truncate(MAX_ROSTER_LEN);
        }
        Self {
            days: DashMap::new(),
            entity_to_day: DashMap::new(),
            roster,
            grid,
        }
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn get_day(&self, date: &NaiveDate) -> Option<SharedDayState> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub fn get_day_for_entity(&self, id: &str) -> Option<NaiveDate> {
        self.entity_to_day.get(id).map(|e| *e.value())
    }

    pub fn appointment_count(&self) -> usize {
        self.entity_to_day.len()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Get the day's state, creating it empty if needed.
    fn day_or_insert(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .clone()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(GridConfig::default(), Vec::new())
    }
}
