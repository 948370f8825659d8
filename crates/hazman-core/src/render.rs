//! Plain-text dashboard and error views.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::calendar::CalendarEvent;
use crate::countdown::{CountdownFrame, CountdownKind, CountdownTick, format_remaining};
use crate::dashboard::DashboardSnapshot;
use crate::error::DashboardError;
use crate::locale::{Locale, Text};
use crate::location::ResolvedLocation;

const PENDING: &str = "--:--:--";

/// Latest countdown text per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownDisplay {
    candles: Option<String>,
    holiday: Option<String>,
}

impl CountdownDisplay {
    /// Records a frame; returns `true` when the frame asks for a full refresh.
    pub fn apply(&mut self, frame: &CountdownFrame, locale: Locale) -> bool {
        let text = match &frame.tick {
            CountdownTick::RefreshDue => return true,
            _ if frame.kind.is_silent() => return false,
            CountdownTick::Remaining(text) => text.clone(),
            CountdownTick::Elapsed => match frame.kind {
                CountdownKind::ShabbatCandles => locale.text(Text::ShabbatShalom).to_string(),
                _ => format_remaining(0),
            },
        };
        match frame.kind {
            CountdownKind::ShabbatCandles => self.candles = Some(text),
            CountdownKind::NextHoliday => self.holiday = Some(text),
            CountdownKind::DayRollover => {}
        }
        false
    }

    pub fn clear(&mut self) {
        self.candles = None;
        self.holiday = None;
    }

    /// Static text for a one-shot render at `now`.
    pub fn at(snapshot: &DashboardSnapshot, now: DateTime<Utc>) -> Self {
        let remaining = |target: DateTime<Utc>| {
            let seconds = (target - now).num_seconds();
            (seconds > 0).then(|| format_remaining(seconds))
        };
        Self {
            candles: snapshot
                .candle_lighting
                .as_ref()
                .and_then(|candles| remaining(candles.target.with_timezone(&Utc))),
            holiday: snapshot
                .next_holiday_start
                .and_then(|start| remaining(start.with_timezone(&Utc))),
        }
    }
}

pub fn render_dashboard(
    snapshot: &DashboardSnapshot,
    location: &ResolvedLocation,
    countdowns: &CountdownDisplay,
    locale: Locale,
) -> String {
    let mut out = String::new();
    let place = match (&snapshot.place.city, location.name.as_deref()) {
        (None, Some(name)) => name.to_string(),
        _ => snapshot.place.label(locale),
    };

    line(&mut out, locale.text(Text::Location), &format!(
        "{place} ({})",
        location.source.label(locale)
    ));
    line(&mut out, locale.text(Text::Coordinates), &snapshot.coordinates.to_string());
    let sunset = snapshot
        .sunset()
        .map(|sunset| sunset.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    line(&mut out, locale.text(Text::Sunset), &sunset);
    line(&mut out, locale.text(Text::HebrewDate), &snapshot.hebrew_date.to_string());

    out.push('\n');
    let check = locale.text(Text::CheckSefer);
    match &snapshot.torah_portion {
        Some(portion) => {
            line(&mut out, locale.text(Text::Parashah), &portion.name);
            line(&mut out, locale.text(Text::Torah), portion.torah.as_deref().unwrap_or(check));
            line(&mut out, locale.text(Text::Haftarah), portion.haftarah.as_deref().unwrap_or(check));
        }
        None => {
            line(&mut out, locale.text(Text::Parashah), check);
        }
    }

    out.push('\n');
    if snapshot.shabbat_active {
        let label = if snapshot.havdalah_listed {
            Text::Havdalah
        } else {
            Text::ShabbatIn
        };
        line(&mut out, locale.text(label), locale.text(Text::ShabbatShalom));
    } else {
        let countdown = match (&snapshot.candle_lighting, countdowns.candles.as_deref()) {
            (Some(_), Some(text)) => text,
            _ => PENDING,
        };
        line(&mut out, locale.text(Text::ShabbatIn), countdown);
    }

    let current = snapshot
        .holidays
        .current
        .as_ref()
        .map(|holiday| holiday.title.as_str())
        .unwrap_or_else(|| locale.text(Text::NoHolidayToday));
    line(&mut out, locale.text(Text::CurrentHoliday), current);

    match &snapshot.holidays.next {
        Some(next) => {
            let countdown = countdowns.holiday.as_deref().unwrap_or(PENDING);
            line(&mut out, locale.text(Text::NextHoliday), &next_holiday(next, countdown, locale));
        }
        None => {
            line(&mut out, locale.text(Text::NextHoliday), &format!(
                "{}. {}",
                locale.text(Text::NoHolidays),
                locale.text(Text::CheckCalendar)
            ));
        }
    }

    if let Some(theme) = snapshot.theme {
        let _ = writeln!(out, "[{}]", theme.label());
    }
    out
}

fn next_holiday(event: &CalendarEvent, countdown: &str, locale: Locale) -> String {
    format!("{}, {} ({countdown})", event.title, locale.day_month(event.date))
}

pub fn render_error(err: &DashboardError, locale: Locale) -> String {
    format!(
        "{}\n{}\n{}\n",
        locale.text(Text::ErrorTitle),
        err.user_message(locale),
        locale.text(Text::RetryHint)
    )
}

fn line(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{label:<18} {value}");
}
