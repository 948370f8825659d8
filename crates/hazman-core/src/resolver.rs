//! Sunset-relative day reference.
//!
//! The Hebrew calendar day rolls over at sunset, not at midnight. A
//! [`DayReference`] is resolved once per refresh and every downstream lookup
//! (holidays, Torah portion, candle lighting, Hebrew date conversion) reads the
//! same `effective_date` and `past_threshold` from it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Weekday};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq)]
pub struct DayReference {
    pub now: DateTime<Tz>,
    /// Civil date of `now` in the location's zone.
    pub today: NaiveDate,
    pub sunset: Option<DateTime<Tz>>,
    /// `sunset - pre_sunset`; `None` without sunset data.
    pub threshold: Option<DateTime<Tz>>,
    pub past_threshold: bool,
    pub effective_date: NaiveDate,
}

impl DayReference {
    pub fn resolve(now: DateTime<Tz>, sunset: Option<DateTime<Tz>>, pre_sunset: Duration) -> Self {
        let today = now.date_naive();
        let threshold = sunset.map(|sunset| sunset - pre_sunset);
        let past_threshold = threshold.is_some_and(|threshold| now >= threshold);
        let effective_date = if past_threshold {
            today.succ_opt().unwrap_or(today)
        } else {
            today
        };

        Self {
            now,
            today,
            sunset,
            threshold,
            past_threshold,
            effective_date,
        }
    }

    /// Keeps the effective date from moving backwards within a session.
    ///
    /// Returns `true` when the date had to be raised to `floor`.
    pub fn clamp_to(&mut self, floor: NaiveDate) -> bool {
        if self.effective_date < floor {
            self.effective_date = floor;
            true
        } else {
            false
        }
    }

    /// Gregorian date and "after sundown" flag for the Hebrew date conversion.
    ///
    /// Both values describe `effective_date`, so the converted Hebrew date can
    /// never disagree with the holiday lookup.
    pub fn conversion_input(&self) -> (NaiveDate, bool) {
        if self.past_threshold && self.today.succ_opt() == Some(self.effective_date) {
            (self.today, true)
        } else {
            (self.effective_date, false)
        }
    }

    /// Next instant at which a refresh changes what the dashboard shows.
    ///
    /// That is the threshold while it lies ahead. Once it has passed (or
    /// without sunset data) it is the next local midnight, where a refresh
    /// picks up the new day's sunset.
    pub fn next_rollover(&self) -> Option<DateTime<Tz>> {
        if let Some(threshold) = self.threshold.filter(|threshold| *threshold > self.now) {
            return Some(threshold);
        }
        let midnight = self.today.succ_opt()?.and_hms_opt(0, 0, 0)?;
        self.now.timezone().from_local_datetime(&midnight).earliest()
    }

    /// Shabbat runs from Friday's threshold until Saturday's threshold.
    pub fn shabbat_active(&self) -> bool {
        if self.threshold.is_none() {
            return false;
        }
        match self.now.weekday() {
            Weekday::Fri => self.past_threshold,
            Weekday::Sat => !self.past_threshold,
            _ => false,
        }
    }
}
