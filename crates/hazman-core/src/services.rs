//! HTTP clients for the Hebcal, BigDataCloud and Nominatim APIs.
//!
//! Every call goes through [`Services::get_json`], which turns transport
//! failures, non-success statuses and malformed bodies into
//! [`DashboardError`] values. Payload structs stay private; callers only see
//! the normalized types from [`crate::calendar`] and [`crate::location`].

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::calendar::{
    CalendarEvent, EventCategory, HebrewDate, Subcategory, ZmanimTimes, parse_event_date,
};
use crate::config::ServiceEndpoints;
use crate::error::DashboardError;
use crate::locale::Locale;
use crate::location::{Coordinates, Place, SearchHit};

const HEBCAL: &str = "hebcal";
const BIGDATACLOUD: &str = "bigdatacloud";
const NOMINATIM: &str = "nominatim";

/// Date range and flags for one calendar request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventsQuery {
    pub coordinates: Coordinates,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub israel: bool,
}

#[derive(Debug, Clone)]
pub struct Services {
    client: Client,
    endpoints: ServiceEndpoints,
}

impl Services {
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self, DashboardError> {
        let client = Client::builder()
            .user_agent(endpoints.user_agent.clone())
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// City, district and country for a position.
    pub async fn reverse_geocode(
        &self,
        coordinates: Coordinates,
        locale: Locale,
    ) -> Result<Place, DashboardError> {
        let url = build_url(
            &self.endpoints.bigdatacloud_url,
            "/data/reverse-geocode-client",
            &[
                ("latitude", coordinates.latitude.to_string()),
                ("longitude", coordinates.longitude.to_string()),
                ("localityLanguage", locale.to_string()),
            ],
        );
        let payload: ReverseGeocodePayload = self.get_json(BIGDATACLOUD, &url).await?;
        Ok(Place::from(payload))
    }

    /// Best match for a free-text place name, if any.
    pub async fn search(&self, query: &str) -> Result<Option<SearchHit>, DashboardError> {
        let url = build_url(
            &self.endpoints.nominatim_url,
            "/search",
            &[
                ("format", "json".to_string()),
                ("q", query.to_string()),
                ("limit", "1".to_string()),
            ],
        );
        let hits: Vec<NominatimHit> = self.get_json(NOMINATIM, &url).await?;
        hits.into_iter()
            .next()
            .map(SearchHit::try_from)
            .transpose()
    }

    /// Sunset for `date`, or for the server's notion of today when `date` is `None`.
    pub async fn zmanim(
        &self,
        coordinates: Coordinates,
        date: Option<NaiveDate>,
    ) -> Result<ZmanimTimes, DashboardError> {
        let mut params = vec![
            ("cfg", "json".to_string()),
            ("latitude", coordinates.latitude.to_string()),
            ("longitude", coordinates.longitude.to_string()),
        ];
        if let Some(date) = date {
            params.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        let url = build_url(&self.endpoints.hebcal_url, "/zmanim", &params);
        let payload: ZmanimPayload = self.get_json(HEBCAL, &url).await?;
        ZmanimTimes::try_from(payload)
    }

    /// Events in `[start, end]`, sorted by date with the upstream order kept within a date.
    pub async fn calendar_events(
        &self,
        query: &EventsQuery,
    ) -> Result<Vec<CalendarEvent>, DashboardError> {
        let url = build_url(
            &self.endpoints.hebcal_url,
            "/hebcal",
            &[
                ("v", "1".to_string()),
                ("cfg", "json".to_string()),
                ("geo", "pos".to_string()),
                ("latitude", query.coordinates.latitude.to_string()),
                ("longitude", query.coordinates.longitude.to_string()),
                ("start", query.start.format("%Y-%m-%d").to_string()),
                ("end", query.end.format("%Y-%m-%d").to_string()),
                ("maj", "on".to_string()),
                ("min", "on".to_string()),
                ("mod", "off".to_string()),
                ("nx", "on".to_string()),
                ("mf", "off".to_string()),
                ("ss", "off".to_string()),
                ("s", "on".to_string()),
                ("c", "on".to_string()),
                ("i", if query.israel { "on" } else { "off" }.to_string()),
            ],
        );
        let payload: HebcalPayload = self.get_json(HEBCAL, &url).await?;

        let total = payload.items.len();
        let mut events: Vec<CalendarEvent> = payload
            .items
            .into_iter()
            .filter_map(HebcalItem::into_event)
            .collect();
        if events.len() < total {
            warn!(
                skipped = total - events.len(),
                "Dropped calendar items with unreadable dates"
            );
        }
        events.sort_by_key(|event| event.date);
        debug!(count = events.len(), "Calendar events fetched");
        Ok(events)
    }

    /// Hebrew date of `date`, shifted to the next day when `after_sunset` is set.
    pub async fn hebrew_date(
        &self,
        date: NaiveDate,
        after_sunset: bool,
    ) -> Result<HebrewDate, DashboardError> {
        let mut params = vec![
            ("cfg", "json".to_string()),
            ("gy", date.year().to_string()),
            ("gm", date.month().to_string()),
            ("gd", date.day().to_string()),
            ("g2h", "1".to_string()),
            ("strict", "1".to_string()),
        ];
        if after_sunset {
            params.push(("gs", "on".to_string()));
        }
        let url = build_url(&self.endpoints.hebcal_url, "/converter", &params);
        let payload: ConverterPayload = self.get_json(HEBCAL, &url).await?;
        Ok(HebrewDate::from(payload))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: &str,
    ) -> Result<T, DashboardError> {
        debug!(service, url, "Requesting");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(service, status = status.as_u16(), "Upstream service error");
            return Err(DashboardError::ServiceUnavailable {
                service,
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            DashboardError::unexpected(format!("malformed {service} response: {err}"))
        })
    }
}

fn build_url(base: &str, path: &str, params: &[(&str, String)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}{path}?{query}", base.trim_end_matches('/'))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
struct HebcalPayload {
    #[serde(default)]
    items: Vec<HebcalItem>,
}

#[derive(Debug, Deserialize)]
struct HebcalItem {
    #[serde(default)]
    title: String,
    date: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    subcat: Option<String>,
    #[serde(default)]
    leyning: Option<LeyningPayload>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LeyningPayload {
    #[serde(default)]
    torah: Option<String>,
    #[serde(default)]
    haftarah: Option<String>,
}

impl HebcalItem {
    fn into_event(self) -> Option<CalendarEvent> {
        let Some((date, instant)) = parse_event_date(&self.date) else {
            debug!(date = %self.date, title = %self.title, "Unreadable event date");
            return None;
        };

        let mut event = CalendarEvent::new(date, EventCategory::parse(&self.category), self.title);
        if let Some(instant) = instant {
            event = event.with_instant(instant);
        }
        if let Some(subcat) = self.subcat.as_deref() {
            event = event.with_subcategory(Subcategory::parse(subcat));
        }
        if let Some(leyning) = self.leyning {
            event = event.with_leyning(leyning.torah.as_deref(), leyning.haftarah.as_deref());
        }
        if let Some(link) = self.link {
            event = event.with_link(link);
        }
        Some(event)
    }
}

#[derive(Debug, Deserialize)]
struct ZmanimPayload {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    location: ZmanimLocation,
    #[serde(default)]
    times: ZmanimClock,
}

#[derive(Debug, Deserialize, Default)]
struct ZmanimLocation {
    #[serde(default)]
    tzid: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ZmanimClock {
    #[serde(default)]
    sunset: Option<String>,
}

impl TryFrom<ZmanimPayload> for ZmanimTimes {
    type Error = DashboardError;

    fn try_from(payload: ZmanimPayload) -> Result<Self, Self::Error> {
        let tzid = non_empty(payload.location.tzid)
            .ok_or_else(|| DashboardError::unexpected("zmanim response has no tzid"))?;
        let tz: Tz = tzid
            .parse()
            .map_err(|_| DashboardError::unexpected(format!("unknown time zone '{tzid}'")))?;

        let sunset = payload.times.sunset.as_deref().and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(instant) => Some(instant.with_timezone(&tz)),
                Err(err) => {
                    warn!(sunset = raw, error = %err, "Ignoring unreadable sunset time");
                    None
                }
            }
        });

        let date = match payload.date.as_deref().and_then(parse_event_date) {
            Some((date, _)) => date,
            None => sunset
                .map(|sunset| sunset.date_naive())
                .ok_or_else(|| DashboardError::unexpected("zmanim response has no date"))?,
        };

        Ok(ZmanimTimes { date, tz, sunset })
    }
}

#[derive(Debug, Deserialize)]
struct ConverterPayload {
    hy: i32,
    hm: String,
    hd: u32,
    #[serde(default)]
    hebrew: Option<String>,
}

impl From<ConverterPayload> for HebrewDate {
    fn from(payload: ConverterPayload) -> Self {
        HebrewDate {
            day: payload.hd,
            month: payload.hm,
            year: payload.hy,
            hebrew: non_empty(payload.hebrew),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseGeocodePayload {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    principal_subdivision: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

impl From<ReverseGeocodePayload> for Place {
    fn from(payload: ReverseGeocodePayload) -> Self {
        Place {
            city: non_empty(payload.city).or_else(|| non_empty(payload.locality)),
            district: non_empty(payload.principal_subdivision),
            country: non_empty(payload.country_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl TryFrom<NominatimHit> for SearchHit {
    type Error = DashboardError;

    fn try_from(hit: NominatimHit) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            raw.trim().parse::<f64>().map_err(|err| {
                DashboardError::unexpected(format!("malformed coordinate '{raw}': {err}"))
            })
        };
        let coordinates = Coordinates::new(parse(&hit.lat)?, parse(&hit.lon)?)?;
        Ok(SearchHit {
            coordinates,
            name: non_empty(hit.display_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_encodes_values() {
        let url = build_url(
            "http://localhost:1234/",
            "/search",
            &[("q", "São Paulo".to_string()), ("limit", "1".to_string())],
        );
        assert_eq!(url, "http://localhost:1234/search?q=S%C3%A3o%20Paulo&limit=1");
    }

    #[test]
    fn hebcal_item_keeps_leyning_and_link() {
        let raw = r#"{
            "title": "Parashat Vayigash",
            "date": "2025-01-04",
            "category": "parashat",
            "hebrew": "פרשת ויגש",
            "leyning": {"1": "Genesis 44:18-30", "torah": "Genesis 44:18-47:27", "haftarah": "Ezekiel 37:15-28"},
            "link": "https://hebcal.com/s/5785/11"
        }"#;
        let item: HebcalItem = serde_json::from_str(raw).unwrap();
        let event = item.into_event().unwrap();
        assert_eq!(event.category, EventCategory::Parashat);
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
        let leyning = event.leyning.unwrap();
        assert_eq!(leyning.torah.as_deref(), Some("Genesis 44:18-47:27"));
        assert_eq!(leyning.haftarah.as_deref(), Some("Ezekiel 37:15-28"));
    }

    #[test]
    fn hebcal_item_with_bad_date_is_skipped() {
        let item: HebcalItem =
            serde_json::from_str(r#"{"title": "x", "date": "soon", "category": "holiday"}"#)
                .unwrap();
        assert!(item.into_event().is_none());
    }

    #[test]
    fn zmanim_payload_uses_location_zone() {
        let raw = r#"{
            "date": "2025-01-04",
            "location": {"tzid": "Asia/Jerusalem"},
            "times": {"sunset": "2025-01-04T16:52:00+02:00"}
        }"#;
        let payload: ZmanimPayload = serde_json::from_str(raw).unwrap();
        let times = ZmanimTimes::try_from(payload).unwrap();
        assert_eq!(times.tz, chrono_tz::Asia::Jerusalem);
        assert_eq!(times.date, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
        assert_eq!(
            times.sunset.unwrap().format("%H:%M").to_string(),
            "16:52"
        );
    }

    #[test]
    fn zmanim_without_tzid_is_rejected() {
        let payload: ZmanimPayload =
            serde_json::from_str(r#"{"date": "2025-01-04", "times": {}}"#).unwrap();
        assert!(ZmanimTimes::try_from(payload).is_err());
    }

    #[test]
    fn reverse_geocode_prefers_city_then_locality() {
        let payload: ReverseGeocodePayload = serde_json::from_str(
            r#"{"city": "", "locality": "Old City", "principalSubdivision": "Jerusalem District", "countryName": "Israel"}"#,
        )
        .unwrap();
        let place = Place::from(payload);
        assert_eq!(place.city.as_deref(), Some("Old City"));
        assert_eq!(place.district.as_deref(), Some("Jerusalem District"));
        assert_eq!(place.country.as_deref(), Some("Israel"));
    }

    #[test]
    fn nominatim_hit_parses_string_coordinates() {
        let hit: NominatimHit = serde_json::from_str(
            r#"{"lat": "38.7077507", "lon": "-9.1365919", "display_name": "Lisboa, Portugal"}"#,
        )
        .unwrap();
        let hit = SearchHit::try_from(hit).unwrap();
        assert!((hit.coordinates.latitude - 38.7077507).abs() < 1e-9);
        assert_eq!(hit.name.as_deref(), Some("Lisboa, Portugal"));
    }
}
