use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::utils::{parse_date, parse_time};

/// Recurring weekly slot. `day_of_week` counts from Sunday = 0.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct WeeklySlot {
    pub id: String,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
}

/// One-off slot on a specific date.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct SpecificSlot {
    pub id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub is_booked: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Availability {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub achiever_id: ObjectId,
    #[serde(default)]
    pub weekly_slots: Vec<WeeklySlot>,
    #[serde(default)]
    pub specific_slots: Vec<SpecificSlot>,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeeklySlotInput {
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateWeeklyDto {
    pub slots: Vec<WeeklySlotInput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddSlotDto {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

/// Half-open time-of-day interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        let start_t = parse_time(start).ok_or_else(|| format!("Invalid start time '{}'", start))?;
        let end_t = parse_time(end).ok_or_else(|| format!("Invalid end time '{}'", end))?;
        if end_t <= start_t {
            return Err("End time must be after start time".to_string());
        }
        Ok(TimeWindow { start: start_t, end: end_t })
    }

    /// Window starting at `start` and lasting `minutes`; must end the same day.
    pub fn starting_at(start: &str, minutes: i32) -> Result<Self, String> {
        let start_t = parse_time(start).ok_or_else(|| format!("Invalid start time '{}'", start))?;
        let (end_t, overflow) =
            start_t.overflowing_add_signed(chrono::Duration::minutes(minutes as i64));
        if overflow != 0 || end_t <= start_t {
            return Err("Session must end on the same day".to_string());
        }
        Ok(TimeWindow { start: start_t, end: end_t })
    }

    pub fn minutes(&self) -> i32 {
        (self.end - self.start).num_minutes() as i32
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn end_string(&self) -> String {
        self.end.format("%H:%M").to_string()
    }
}

/// Whether `window` on `date` has already started at `now`.
pub fn starts_before(date: NaiveDate, window: &TimeWindow, now: NaiveDateTime) -> bool {
    date.and_time(window.start) < now
}

pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

fn first_overlap(windows: &[TimeWindow]) -> Option<(usize, usize)> {
    for i in 0..windows.len() {
        for j in (i + 1)..windows.len() {
            if windows[i].overlaps(&windows[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

const DAY_NAMES: [&str; 7] = ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];

/// Validates a replacement weekly schedule and recomputes every slot's duration.
pub fn build_weekly_slots(inputs: Vec<WeeklySlotInput>) -> Result<Vec<WeeklySlot>, String> {
    let mut slots = Vec::with_capacity(inputs.len());
    for input in inputs {
        if !(0..=6).contains(&input.day_of_week) {
            return Err(format!("Invalid day_of_week {}", input.day_of_week));
        }
        let window = TimeWindow::parse(&input.start_time, &input.end_time)?;
        slots.push(WeeklySlot {
            id: uuid::Uuid::new_v4().to_string(),
            day_of_week: input.day_of_week,
            start_time: input.start_time,
            end_time: input.end_time,
            duration_minutes: window.minutes(),
        });
    }

    for day in 0..7 {
        let windows: Vec<TimeWindow> = slots
            .iter()
            .filter(|s| s.day_of_week == day)
            .filter_map(|s| TimeWindow::parse(&s.start_time, &s.end_time).ok())
            .collect();
        if first_overlap(&windows).is_some() {
            return Err(format!("Overlapping slots on {}", DAY_NAMES[day as usize]));
        }
    }

    slots.sort_by(|a, b| (a.day_of_week, &a.start_time).cmp(&(b.day_of_week, &b.start_time)));
    Ok(slots)
}

impl Availability {
    pub fn empty(achiever_id: ObjectId) -> Self {
        Availability {
            id: None,
            achiever_id,
            weekly_slots: Vec::new(),
            specific_slots: Vec::new(),
            updated_at: DateTime::now(),
        }
    }

    /// Builds a one-off slot after checking it is not in the past and does not
    /// collide with another slot on the same date.
    pub fn new_specific_slot(&self, dto: &AddSlotDto, now: NaiveDateTime) -> Result<SpecificSlot, String> {
        let date = parse_date(&dto.date).ok_or_else(|| format!("Invalid date '{}'", dto.date))?;
        let window = TimeWindow::parse(&dto.start_time, &dto.end_time)?;
        if starts_before(date, &window, now) {
            return Err("Cannot add a slot in the past".to_string());
        }

        let clash = self
            .specific_slots
            .iter()
            .filter(|s| s.date == dto.date)
            .filter_map(|s| TimeWindow::parse(&s.start_time, &s.end_time).ok())
            .any(|w| w.overlaps(&window));
        if clash {
            return Err("Slot overlaps an existing slot on that date".to_string());
        }

        Ok(SpecificSlot {
            id: uuid::Uuid::new_v4().to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            start_time: dto.start_time.clone(),
            end_time: dto.end_time.clone(),
            duration_minutes: window.minutes(),
            is_booked: false,
        })
    }

    /// Whether the achiever offers `window` on `date`, either through a weekly
    /// slot for that weekday or an unbooked specific slot on that date.
    pub fn covers(&self, date: NaiveDate, window: &TimeWindow) -> bool {
        let day = weekday_index(date);
        let weekly = self
            .weekly_slots
            .iter()
            .filter(|s| s.day_of_week == day)
            .filter_map(|s| TimeWindow::parse(&s.start_time, &s.end_time).ok())
            .any(|w| w.contains(window));

        weekly || self.specific_slot_for(date, window).is_some()
    }

    /// The unbooked specific slot on `date` that contains `window`, if any.
    pub fn specific_slot_for(&self, date: NaiveDate, window: &TimeWindow) -> Option<&SpecificSlot> {
        let date_str = date.format("%Y-%m-%d").to_string();
        self.specific_slots.iter().find(|s| {
            !s.is_booked
                && s.date == date_str
                && TimeWindow::parse(&s.start_time, &s.end_time)
                    .map(|w| w.contains(window))
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(day: i32, start: &str, end: &str) -> WeeklySlotInput {
        WeeklySlotInput {
            day_of_week: day,
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn duration_is_recomputed_from_times() {
        assert_eq!(TimeWindow::parse("09:00", "10:30").map(|w| w.minutes()), Ok(90));
        assert!(TimeWindow::parse("10:00", "10:00").is_err());
        assert!(TimeWindow::parse("18:00", "09:00").is_err());
        assert!(TimeWindow::parse("9am", "10:00").is_err());
    }

    #[test]
    fn windows_touching_at_the_edge_do_not_overlap() {
        let a = TimeWindow::parse("09:00", "10:00").unwrap();
        let b = TimeWindow::parse("10:00", "11:00").unwrap();
        let c = TimeWindow::parse("09:30", "10:15").unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn starting_at_rejects_spill_past_midnight() {
        let w = TimeWindow::starting_at("22:30", 60).unwrap();
        assert_eq!(w.end_string(), "23:30");
        assert!(TimeWindow::starting_at("23:30", 60).is_err());
    }

    #[test]
    fn weekly_slots_are_sorted_with_durations() {
        let slots = build_weekly_slots(vec![
            weekly(3, "18:00", "19:00"),
            weekly(1, "09:00", "11:00"),
            weekly(1, "07:00", "08:00"),
        ])
        .unwrap();

        let order: Vec<(i32, &str, i32)> = slots
            .iter()
            .map(|s| (s.day_of_week, s.start_time.as_str(), s.duration_minutes))
            .collect();
        assert_eq!(order, vec![(1, "07:00", 60), (1, "09:00", 120), (3, "18:00", 60)]);
    }

    #[test]
    fn weekly_overlap_on_same_day_is_rejected() {
        let err = build_weekly_slots(vec![weekly(2, "09:00", "11:00"), weekly(2, "10:00", "12:00")])
            .unwrap_err();
        assert!(err.contains("Tuesday"));

        // Same times on different days are fine.
        assert!(build_weekly_slots(vec![weekly(2, "09:00", "11:00"), weekly(4, "10:00", "12:00")]).is_ok());
    }

    #[test]
    fn weekly_day_out_of_range_is_rejected() {
        assert!(build_weekly_slots(vec![weekly(7, "09:00", "10:00")]).is_err());
    }

    #[test]
    fn specific_slot_checks_past_and_overlap() {
        let mut availability = Availability::empty(ObjectId::new());
        let now = date("2026-05-10").and_hms_opt(15, 0, 0).unwrap();

        let past = AddSlotDto { date: "2026-05-09".into(), start_time: "09:00".into(), end_time: "10:00".into() };
        assert!(availability.new_specific_slot(&past, now).is_err());

        let earlier_today = AddSlotDto { date: "2026-05-10".into(), start_time: "08:00".into(), end_time: "09:00".into() };
        assert!(availability.new_specific_slot(&earlier_today, now).is_err());

        let later_today = AddSlotDto { date: "2026-05-10".into(), start_time: "16:00".into(), end_time: "17:00".into() };
        assert!(availability.new_specific_slot(&later_today, now).is_ok());

        let first = AddSlotDto { date: "2026-05-12".into(), start_time: "09:00".into(), end_time: "10:00".into() };
        let slot = availability.new_specific_slot(&first, now).unwrap();
        assert_eq!(slot.duration_minutes, 60);
        availability.specific_slots.push(slot);

        let clash = AddSlotDto { date: "2026-05-12".into(), start_time: "09:30".into(), end_time: "10:30".into() };
        assert!(availability.new_specific_slot(&clash, now).is_err());

        let later = AddSlotDto { date: "2026-05-12".into(), start_time: "10:00".into(), end_time: "11:00".into() };
        assert!(availability.new_specific_slot(&later, now).is_ok());
    }

    #[test]
    fn start_time_counts_for_the_past_check() {
        let now = date("2026-05-10").and_hms_opt(15, 0, 0).unwrap();
        let morning = TimeWindow::starting_at("08:00", 60).unwrap();
        let evening = TimeWindow::starting_at("18:00", 60).unwrap();
        assert!(starts_before(date("2026-05-10"), &morning, now));
        assert!(!starts_before(date("2026-05-10"), &evening, now));
        assert!(starts_before(date("2026-05-09"), &evening, now));
        assert!(!starts_before(date("2026-05-11"), &morning, now));
    }

    #[test]
    fn coverage_uses_weekday_and_specific_slots() {
        let mut availability = Availability::empty(ObjectId::new());
        // 2026-05-11 is a Monday.
        availability.weekly_slots = build_weekly_slots(vec![weekly(1, "17:00", "20:00")]).unwrap();
        availability.specific_slots.push(SpecificSlot {
            id: "s1".into(),
            date: "2026-05-13".into(),
            start_time: "08:00".into(),
            end_time: "09:00".into(),
            duration_minutes: 60,
            is_booked: false,
        });

        let evening = TimeWindow::starting_at("18:00", 60).unwrap();
        assert!(availability.covers(date("2026-05-11"), &evening));
        assert!(!availability.covers(date("2026-05-12"), &evening));

        let too_long = TimeWindow::starting_at("19:30", 60).unwrap();
        assert!(!availability.covers(date("2026-05-11"), &too_long));

        let morning = TimeWindow::starting_at("08:00", 60).unwrap();
        assert!(availability.covers(date("2026-05-13"), &morning));
        assert_eq!(availability.specific_slot_for(date("2026-05-13"), &morning).map(|s| s.id.as_str()), Some("s1"));

        availability.specific_slots[0].is_booked = true;
        assert!(!availability.covers(date("2026-05-13"), &morning));
    }
}
