//! Weekly study blocks: time-of-day parsing and slot overlap checks.

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::error::AppError;
use crate::types::{NewStudyPlan, StudyPlan};

/// A validated `[start, end)` interval on one day of the week
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, AppError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| AppError::validation(format!("Invalid time of day: {s:?}")))
}

/// Day of week as stored on plans: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

impl Slot {
    pub fn new(day_of_week: u8, start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        if day_of_week > 6 {
            return Err(AppError::validation("Day of week must be between 0 and 6"));
        }
        if start >= end {
            return Err(AppError::validation("End time must be after start time"));
        }
        Ok(Self {
            day_of_week,
            start,
            end,
        })
    }

    pub fn parse(day_of_week: u8, start: &str, end: &str) -> Result<Self, AppError> {
        Self::new(day_of_week, parse_time_of_day(start)?, parse_time_of_day(end)?)
    }

    /// Half-open intervals touching at an endpoint do not overlap.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start < end && self.end > start
    }
}

/// First existing plan on the same day whose interval intersects `slot`.
pub fn find_conflict<'a>(slot: &Slot, existing: &'a [StudyPlan]) -> Option<&'a StudyPlan> {
    existing
        .iter()
        .filter(|plan| plan.day_of_week == slot.day_of_week)
        .find(|plan| slot.overlaps(plan.start_time, plan.end_time))
}

pub fn has_conflict(slot: &Slot, existing: &[StudyPlan]) -> bool {
    find_conflict(slot, existing).is_some()
}

/// Validate a submitted block against the plans already on its day.
///
/// Runs the interval check before the overlap check. Not race-free: two
/// concurrent submissions can both pass.
pub fn check_new_plan(plan: &NewStudyPlan, existing: &[StudyPlan]) -> Result<Slot, AppError> {
    if plan.subject_id.is_empty() {
        return Err(AppError::validation("Study plan must belong to a subject"));
    }
    let slot = Slot::parse(plan.day_of_week, &plan.start_time, &plan.end_time)?;
    if has_conflict(&slot, existing) {
        return Err(AppError::validation(
            "This time slot overlaps with an existing study plan. Please choose a different time.",
        ));
    }
    Ok(slot)
}
