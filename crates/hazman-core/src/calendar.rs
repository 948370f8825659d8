//! Calendar data as returned by the upstream services, normalized.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCategory {
    Parashat,
    Candles,
    Havdalah,
    Holiday,
    RoshChodesh,
    Other(String),
}

impl EventCategory {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "parashat" => EventCategory::Parashat,
            "candles" => EventCategory::Candles,
            "havdalah" => EventCategory::Havdalah,
            "holiday" => EventCategory::Holiday,
            "roshchodesh" => EventCategory::RoshChodesh,
            other => EventCategory::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subcategory {
    Major,
    Minor,
    Other(String),
}

impl Subcategory {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "major" => Subcategory::Major,
            "minor" => Subcategory::Minor,
            other => Subcategory::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leyning {
    pub torah: Option<String>,
    pub haftarah: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    /// Civil date of the event in the location's zone.
    pub date: NaiveDate,
    /// Present for timed events such as candle lighting and havdalah.
    pub instant: Option<DateTime<FixedOffset>>,
    pub category: EventCategory,
    pub title: String,
    pub subcategory: Option<Subcategory>,
    pub leyning: Option<Leyning>,
    pub link: Option<String>,
}

impl CalendarEvent {
    pub fn new(date: NaiveDate, category: EventCategory, title: impl Into<String>) -> Self {
        Self {
            date,
            instant: None,
            category,
            title: title.into(),
            subcategory: None,
            leyning: None,
            link: None,
        }
    }

    pub fn with_subcategory(mut self, subcategory: Subcategory) -> Self {
        self.subcategory = Some(subcategory);
        self
    }

    pub fn with_leyning(mut self, torah: Option<&str>, haftarah: Option<&str>) -> Self {
        self.leyning = Some(Leyning {
            torah: torah.map(str::to_string),
            haftarah: haftarah.map(str::to_string),
        });
        self
    }

    pub fn with_instant(mut self, instant: DateTime<FixedOffset>) -> Self {
        self.instant = Some(instant);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn is_holiday_like(&self) -> bool {
        matches!(
            self.category,
            EventCategory::Holiday | EventCategory::RoshChodesh
        )
    }

    /// Major holidays outrank Rosh Chodesh, which outranks everything else.
    pub fn holiday_rank(&self) -> u8 {
        if self.subcategory == Some(Subcategory::Major) {
            3
        } else if self.category == EventCategory::RoshChodesh {
            2
        } else {
            1
        }
    }

    /// Stable holiday identifier taken from the event link, e.g. `rosh-hashana`.
    pub fn holiday_slug(&self) -> Option<String> {
        let link = self.link.as_deref()?;
        let path = link.split(['?', '#']).next()?;
        let segment = path.trim_end_matches('/').rsplit('/').next()?;
        if segment.is_empty() {
            return None;
        }
        let slug = match segment.rsplit_once('-') {
            Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
                head
            }
            _ => segment,
        };
        Some(slug.to_ascii_lowercase())
    }
}

/// Splits an upstream date field into its civil date and, when present, its instant.
///
/// Accepts both `2025-01-10` and `2025-01-10T16:21:00+02:00`.
pub fn parse_event_date(raw: &str) -> Option<(NaiveDate, Option<DateTime<FixedOffset>>)> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some((instant.date_naive(), Some(instant)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| (date, None))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayTheme {
    Matzot,
    Shavuot,
    Teruah,
    Kippur,
    Sukkot,
    Atzeret,
    MajorHoliday,
}

impl HolidayTheme {
    pub fn for_event(event: &CalendarEvent) -> Option<Self> {
        // The eve carries the theme of the holiday it opens.
        let themed = event.holiday_slug().and_then(|slug| match slug.trim_start_matches("erev-") {
            "pesach" => Some(HolidayTheme::Matzot),
            "shavuot" => Some(HolidayTheme::Shavuot),
            "rosh-hashana" => Some(HolidayTheme::Teruah),
            "yom-kippur" => Some(HolidayTheme::Kippur),
            "sukkot" => Some(HolidayTheme::Sukkot),
            "shmini-atzeret" | "simchat-torah" => Some(HolidayTheme::Atzeret),
            _ => None,
        });
        themed.or_else(|| {
            (event.subcategory == Some(Subcategory::Major)).then_some(HolidayTheme::MajorHoliday)
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            HolidayTheme::Matzot => "matzot",
            HolidayTheme::Shavuot => "shavuot",
            HolidayTheme::Teruah => "teruah",
            HolidayTheme::Kippur => "kippur",
            HolidayTheme::Sukkot => "sukkot",
            HolidayTheme::Atzeret => "atzeret",
            HolidayTheme::MajorHoliday => "holiday",
        }
    }
}

/// Solar times for one civil date at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct ZmanimTimes {
    pub date: NaiveDate,
    pub tz: Tz,
    pub sunset: Option<DateTime<Tz>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HebrewDate {
    pub day: u32,
    pub month: String,
    pub year: i32,
    pub hebrew: Option<String>,
}

impl fmt::Display for HebrewDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.day, self.month, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_plain_and_timed_dates() {
        let (plain, none) = parse_event_date("2025-01-04").unwrap();
        assert_eq!(plain, date(2025, 1, 4));
        assert!(none.is_none());

        let (timed, instant) = parse_event_date("2025-01-03T16:21:00+02:00").unwrap();
        assert_eq!(timed, date(2025, 1, 3));
        assert_eq!(instant.unwrap().to_rfc3339(), "2025-01-03T16:21:00+02:00");

        assert!(parse_event_date("next friday").is_none());
    }

    #[test]
    fn rank_prefers_major_then_rosh_chodesh() {
        let major = CalendarEvent::new(date(2025, 3, 1), EventCategory::Holiday, "Purim")
            .with_subcategory(Subcategory::Major);
        let rc = CalendarEvent::new(date(2025, 3, 1), EventCategory::RoshChodesh, "Rosh Chodesh");
        let minor = CalendarEvent::new(date(2025, 3, 1), EventCategory::Holiday, "Ta'anit")
            .with_subcategory(Subcategory::Minor);
        assert_eq!(major.holiday_rank(), 3);
        assert_eq!(rc.holiday_rank(), 2);
        assert_eq!(minor.holiday_rank(), 1);
    }

    #[test]
    fn theme_comes_from_link_slug_not_title() {
        let event = CalendarEvent::new(date(2025, 4, 13), EventCategory::Holiday, "Festa")
            .with_link("https://hebcal.com/h/pesach-2025?us=js&um=api");
        assert_eq!(event.holiday_slug().as_deref(), Some("pesach"));
        assert_eq!(HolidayTheme::for_event(&event), Some(HolidayTheme::Matzot));

        let misleading =
            CalendarEvent::new(date(2025, 4, 12), EventCategory::Holiday, "Shabbat HaGadol")
                .with_link("https://www.hebcal.com/holidays/shabbat-hagadol-2025");
        assert_eq!(HolidayTheme::for_event(&misleading), None);
    }

    #[test]
    fn major_without_known_slug_uses_generic_theme() {
        let event = CalendarEvent::new(date(2025, 6, 2), EventCategory::Holiday, "Erev Shavuot")
            .with_subcategory(Subcategory::Major);
        assert_eq!(
            HolidayTheme::for_event(&event),
            Some(HolidayTheme::MajorHoliday)
        );
    }

    #[test]
    fn eve_takes_the_theme_of_its_holiday() {
        let erev_pesach = CalendarEvent::new(date(2025, 4, 12), EventCategory::Holiday, "Erev Pesach")
            .with_subcategory(Subcategory::Major)
            .with_link("https://www.hebcal.com/holidays/erev-pesach-2025");
        assert_eq!(erev_pesach.holiday_slug().as_deref(), Some("erev-pesach"));
        assert_eq!(HolidayTheme::for_event(&erev_pesach), Some(HolidayTheme::Matzot));

        let erev_sukkot = CalendarEvent::new(date(2025, 10, 6), EventCategory::Holiday, "Erev Sukkot")
            .with_link("https://www.hebcal.com/holidays/erev-sukkot-2025");
        assert_eq!(HolidayTheme::for_event(&erev_sukkot), Some(HolidayTheme::Sukkot));

        let erev_yk = CalendarEvent::new(date(2025, 10, 1), EventCategory::Holiday, "Erev Yom Kippur")
            .with_link("https://www.hebcal.com/holidays/erev-yom-kippur-2025");
        assert_eq!(HolidayTheme::for_event(&erev_yk), Some(HolidayTheme::Kippur));
    }
}
