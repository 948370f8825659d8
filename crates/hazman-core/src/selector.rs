//! Picks the Torah portion, holidays and candle-lighting target for a day.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::calendar::{CalendarEvent, EventCategory};
use crate::resolver::DayReference;

pub const NAME_SEPARATOR: &str = "-";
pub const RANGE_SEPARATOR: &str = " - ";
const PARASHAT_PREFIX: &str = "Parashat ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorahPortion {
    pub date: NaiveDate,
    /// Combined name, e.g. `Matot-Masei`.
    pub name: String,
    pub torah: Option<String>,
    pub haftarah: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolidaySelection {
    pub current: Option<CalendarEvent>,
    pub next: Option<CalendarEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleLighting {
    pub date: NaiveDate,
    pub target: DateTime<Tz>,
    /// The target was taken from sunset data rather than the listed time.
    pub from_sunset: bool,
}

/// First portion on or after `effective`, merging double portions that share a date.
pub fn select_torah_portion(events: &[CalendarEvent], effective: NaiveDate) -> Option<TorahPortion> {
    let first = events
        .iter()
        .find(|event| event.category == EventCategory::Parashat && event.date >= effective)?;

    let same_date: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| event.category == EventCategory::Parashat && event.date == first.date)
        .collect();

    let name = same_date
        .iter()
        .map(|event| {
            event
                .title
                .strip_prefix(PARASHAT_PREFIX)
                .unwrap_or(&event.title)
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR);

    let torah: Vec<String> = same_date
        .iter()
        .filter_map(|event| event.leyning.as_ref()?.torah.clone())
        .filter(|reading| !reading.trim().is_empty())
        .collect();

    let mut haftarah: Vec<String> = Vec::new();
    for reading in same_date
        .iter()
        .filter_map(|event| event.leyning.as_ref()?.haftarah.clone())
        .filter(|reading| !reading.trim().is_empty())
    {
        if !haftarah.contains(&reading) {
            haftarah.push(reading);
        }
    }

    Some(TorahPortion {
        date: first.date,
        name,
        torah: merge_ranges(&torah),
        haftarah: merge_ranges(&haftarah),
    })
}

/// Joins consecutive readings into one range: start of the first, end of the last.
pub fn merge_ranges(readings: &[String]) -> Option<String> {
    match readings {
        [] => None,
        [only] => Some(only.clone()),
        [first, .., last] => {
            let start = first.split('-').next().unwrap_or(first).trim();
            let end = last.rsplit('-').next().unwrap_or(last).trim();
            Some(format!("{start}{RANGE_SEPARATOR}{end}"))
        }
    }
}

/// Best holiday per date on or after `effective`, sorted by date.
///
/// Within a date the highest [`CalendarEvent::holiday_rank`] wins and ties
/// keep the event listed first.
pub fn rank_holidays(events: &[CalendarEvent], effective: NaiveDate) -> Vec<CalendarEvent> {
    let mut best: BTreeMap<NaiveDate, &CalendarEvent> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|event| event.is_holiday_like() && event.date >= effective)
    {
        best.entry(event.date)
            .and_modify(|current| {
                if event.holiday_rank() > current.holiday_rank() {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    best.into_values().cloned().collect()
}

pub fn select_holidays(events: &[CalendarEvent], effective: NaiveDate) -> HolidaySelection {
    let ranked = rank_holidays(events, effective);
    let current = ranked.iter().find(|event| event.date == effective).cloned();
    let next = ranked.into_iter().find(|event| event.date > effective);
    HolidaySelection { current, next }
}

/// Next candle lighting on or after the effective date.
///
/// Today's candle lighting counts down to the sunset threshold so the timer
/// and the day rollover fire together.
pub fn select_candle_lighting(
    events: &[CalendarEvent],
    reference: &DayReference,
) -> Option<CandleLighting> {
    let tz = reference.now.timezone();
    let event = events.iter().find(|event| {
        event.category == EventCategory::Candles && event.date >= reference.effective_date
    })?;

    if event.date == reference.today {
        if let Some(threshold) = reference.threshold {
            return Some(CandleLighting {
                date: event.date,
                target: threshold,
                from_sunset: true,
            });
        }
    }

    let target = match event.instant {
        Some(instant) => instant.with_timezone(&tz),
        None => local_midnight(tz, event.date)?,
    };
    Some(CandleLighting {
        date: event.date,
        target,
        from_sunset: false,
    })
}

pub fn has_upcoming_havdalah(events: &[CalendarEvent], today: NaiveDate) -> bool {
    events
        .iter()
        .any(|event| event.category == EventCategory::Havdalah && event.date >= today)
}

/// When a holiday starts: its eve at today's threshold time, or local
/// midnight of the holiday date without sunset data.
pub fn holiday_start(date: NaiveDate, reference: &DayReference) -> Option<DateTime<Tz>> {
    let tz = reference.now.timezone();
    match reference.threshold {
        Some(threshold) => {
            let eve = date.pred_opt()?;
            tz.from_local_datetime(&eve.and_time(threshold.time()))
                .earliest()
        }
        None => local_midnight(tz, date),
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).earliest()
}
