//! One refresh of the dashboard: fetch, resolve the day, select what to show.
//!
//! A refresh runs in two phases. Phase one fetches the place name and the
//! sunset in parallel; the sunset fixes the [`DayReference`]. Phase two
//! fetches the event list and the Hebrew date, both keyed off that single
//! reference. Any failed fetch fails the whole refresh.
//!
//! Each refresh takes a ticket from the session. When a newer refresh has
//! started by the time the fetches settle, the older result is discarded as
//! [`RefreshOutcome::Superseded`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::calendar::{HebrewDate, HolidayTheme, ZmanimTimes};
use crate::config::FileConfig;
use crate::countdown::{CountdownKind, Countdowns};
use crate::error::DashboardError;
use crate::leyning::transliterate_books;
use crate::locale::Locale;
use crate::location::{Coordinates, Place};
use crate::resolver::DayReference;
use crate::selector::{
    CandleLighting, HolidaySelection, TorahPortion, has_upcoming_havdalah, holiday_start,
    select_candle_lighting, select_holidays, select_torah_portion,
};
use crate::services::{EventsQuery, Services};

/// The calendar knobs a refresh needs, lifted out of [`FileConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub pre_sunset: chrono::Duration,
    pub horizon_days: u32,
    pub israel_schedule: bool,
    pub transliterate_books: bool,
    pub locale: Locale,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from(&FileConfig::default())
    }
}

impl From<&FileConfig> for DashboardSettings {
    fn from(config: &FileConfig) -> Self {
        Self {
            pre_sunset: config.calendar.pre_sunset(),
            horizon_days: config.calendar.horizon_days,
            israel_schedule: config.calendar.israel_schedule,
            transliterate_books: config.calendar.transliterate_books,
            locale: config.ui.locale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub ticket: u64,
    pub coordinates: Coordinates,
    pub place: Place,
    pub reference: DayReference,
    pub hebrew_date: HebrewDate,
    pub torah_portion: Option<TorahPortion>,
    pub holidays: HolidaySelection,
    pub theme: Option<HolidayTheme>,
    pub shabbat_active: bool,
    /// A havdalah time is listed from today on; labels the Shabbat indicator.
    pub havdalah_listed: bool,
    pub candle_lighting: Option<CandleLighting>,
    pub next_holiday_start: Option<DateTime<Tz>>,
}

impl DashboardSnapshot {
    pub fn sunset(&self) -> Option<DateTime<Tz>> {
        self.reference.sunset
    }

    pub fn time_zone(&self) -> Tz {
        self.reference.now.timezone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Fresh(Box<DashboardSnapshot>),
    /// A newer refresh started while this one was in flight.
    Superseded { ticket: u64, latest: u64 },
}

#[derive(Debug, Clone, Copy)]
struct DateFloor {
    coordinates: Coordinates,
    effective_date: NaiveDate,
}

pub struct DashboardSession {
    services: Services,
    settings: DashboardSettings,
    latest_ticket: AtomicU64,
    floor: Mutex<Option<DateFloor>>,
}

impl DashboardSession {
    pub fn new(services: Services, settings: DashboardSettings) -> Self {
        Self {
            services,
            settings,
            latest_ticket: AtomicU64::new(0),
            floor: Mutex::new(None),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn latest_ticket(&self) -> u64 {
        self.latest_ticket.load(Ordering::SeqCst)
    }

    pub async fn refresh(
        &self,
        coordinates: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, DashboardError> {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        info!(ticket, %coordinates, "Refreshing dashboard");

        let (place, zmanim) = tokio::try_join!(
            self.services
                .reverse_geocode(coordinates, self.settings.locale),
            self.zmanim_for_local_day(coordinates, now),
        )?;
        if let Some(outcome) = self.superseded(ticket) {
            return Ok(outcome);
        }

        let local_now = now.with_timezone(&zmanim.tz);
        let mut reference = DayReference::resolve(local_now, zmanim.sunset, self.settings.pre_sunset);
        self.apply_floor(coordinates, &mut reference);
        debug!(
            ticket,
            today = %reference.today,
            effective = %reference.effective_date,
            past_threshold = reference.past_threshold,
            "Day reference resolved"
        );

        let (conversion_date, after_sunset) = reference.conversion_input();
        let query = EventsQuery {
            coordinates,
            start: reference.today,
            end: reference
                .today
                .checked_add_days(Days::new(u64::from(self.settings.horizon_days)))
                .unwrap_or(reference.today),
            israel: self.settings.israel_schedule,
        };
        let (events, hebrew_date) = tokio::try_join!(
            self.services.calendar_events(&query),
            self.services.hebrew_date(conversion_date, after_sunset),
        )?;
        if let Some(outcome) = self.superseded(ticket) {
            return Ok(outcome);
        }
        self.commit_floor(coordinates, reference.effective_date);

        let mut torah_portion = select_torah_portion(&events, reference.effective_date);
        if self.settings.transliterate_books {
            if let Some(portion) = torah_portion.as_mut() {
                portion.torah = portion.torah.as_deref().map(transliterate_books);
                portion.haftarah = portion.haftarah.as_deref().map(transliterate_books);
            }
        }
        let holidays = select_holidays(&events, reference.effective_date);
        let theme = holidays.current.as_ref().and_then(HolidayTheme::for_event);
        let next_holiday_start = holidays
            .next
            .as_ref()
            .and_then(|next| holiday_start(next.date, &reference));

        let snapshot = DashboardSnapshot {
            ticket,
            coordinates,
            place,
            shabbat_active: reference.shabbat_active(),
            havdalah_listed: has_upcoming_havdalah(&events, reference.today),
            candle_lighting: select_candle_lighting(&events, &reference),
            hebrew_date,
            torah_portion,
            holidays,
            theme,
            next_holiday_start,
            reference,
        };
        info!(
            ticket,
            events = events.len(),
            shabbat = snapshot.shabbat_active,
            "Dashboard refreshed"
        );
        Ok(RefreshOutcome::Fresh(Box::new(snapshot)))
    }

    /// Sunset for the location's own civil date.
    ///
    /// The first request lets the server pick the date, which reveals the
    /// location's zone. If the server's date is not the local date there, the
    /// request is repeated for the local date.
    async fn zmanim_for_local_day(
        &self,
        coordinates: Coordinates,
        now: DateTime<Utc>,
    ) -> Result<ZmanimTimes, DashboardError> {
        let first = self.services.zmanim(coordinates, None).await?;
        let local_today = now.with_timezone(&first.tz).date_naive();
        if first.date == local_today {
            return Ok(first);
        }
        debug!(server = %first.date, local = %local_today, "Re-requesting sunset for local date");
        self.services.zmanim(coordinates, Some(local_today)).await
    }

    fn superseded(&self, ticket: u64) -> Option<RefreshOutcome> {
        let latest = self.latest_ticket();
        (latest != ticket).then(|| {
            info!(ticket, latest, "Discarding stale refresh");
            RefreshOutcome::Superseded { ticket, latest }
        })
    }

    fn apply_floor(&self, coordinates: Coordinates, reference: &mut DayReference) {
        let floor = *self.floor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(floor) = floor.filter(|floor| floor.coordinates == coordinates) {
            let computed = reference.effective_date;
            if reference.clamp_to(floor.effective_date) {
                warn!(%computed, floor = %floor.effective_date, "Effective date moved backwards; clamped");
            }
        }
    }

    fn commit_floor(&self, coordinates: Coordinates, effective_date: NaiveDate) {
        let mut floor = self.floor.lock().unwrap_or_else(PoisonError::into_inner);
        let keep = floor.is_some_and(|current| {
            current.coordinates == coordinates && current.effective_date > effective_date
        });
        if !keep {
            *floor = Some(DateFloor {
                coordinates,
                effective_date,
            });
        }
    }
}

/// Starts, keeps or cancels the countdowns to match a snapshot.
///
/// The candle countdown never runs during Shabbat. Targets that are not in
/// the future cancel their countdown instead of starting one. A silent
/// rollover timer always aims at the next threshold (or midnight), which
/// also ends the Shabbat window.
pub fn sync_countdowns(snapshot: &DashboardSnapshot, countdowns: &mut Countdowns, now: DateTime<Utc>) {
    let rollover = snapshot
        .reference
        .next_rollover()
        .map(|at| at.with_timezone(&Utc))
        .filter(|target| *target > now);
    match rollover {
        Some(target) => {
            countdowns.ensure(CountdownKind::DayRollover, target);
        }
        None => {
            countdowns.cancel(CountdownKind::DayRollover);
        }
    }

    let candle_target = snapshot
        .candle_lighting
        .as_ref()
        .filter(|_| !snapshot.shabbat_active)
        .map(|candles| candles.target.with_timezone(&Utc))
        .filter(|target| *target > now);
    match candle_target {
        Some(target) => {
            countdowns.ensure(CountdownKind::ShabbatCandles, target);
        }
        None => {
            countdowns.cancel(CountdownKind::ShabbatCandles);
        }
    }

    let holiday_target = snapshot
        .next_holiday_start
        .map(|start| start.with_timezone(&Utc))
        .filter(|target| *target > now);
    match holiday_target {
        Some(target) => {
            countdowns.ensure(CountdownKind::NextHoliday, target);
        }
        None => {
            countdowns.cancel(CountdownKind::NextHoliday);
        }
    }
}
