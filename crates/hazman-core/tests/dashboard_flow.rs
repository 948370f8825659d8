//! End-to-end refreshes against mocked Hebcal, BigDataCloud and Nominatim.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Jerusalem;
use hazman_core::calendar::HolidayTheme;
use hazman_core::config::{LocationPreferences, ServiceEndpoints};
use hazman_core::location::{CoordinateStore, LocationSource, search_location};
use hazman_core::{
    Clock, Coordinates, CountdownDisplay, CountdownFrame, CountdownKind, CountdownTick, Countdowns,
    DashboardError, DashboardSession, DashboardSettings, DashboardSnapshot, ErrorKind, FileConfig,
    FixedPosition, FrameStep, LiveDashboard, Locale, RefreshOutcome, ResolvedLocation, Services,
    render_dashboard,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn jerusalem() -> Coordinates {
    Coordinates::new(31.7683, 35.2137).unwrap()
}

fn local(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Jerusalem
        .with_ymd_and_hms(2025, 1, d, h, m, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn session(server: &ServerGuard) -> DashboardSession {
    let services = Services::new(ServiceEndpoints::all_at(&server.url())).unwrap();
    DashboardSession::new(services, DashboardSettings::default())
}

fn zmanim_body(day: u32) -> String {
    json!({
        "date": format!("2025-01-{day:02}"),
        "location": {"tzid": "Asia/Jerusalem", "latitude": 31.7683, "longitude": 35.2137},
        "times": {"sunset": format!("2025-01-{day:02}T18:00:00+02:00")}
    })
    .to_string()
}

async fn mock_json(server: &mut ServerGuard, path: &str, query: Matcher, body: String) -> Mock {
    server
        .mock("GET", path)
        .match_query(query)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

fn calendar_body() -> String {
    json!({
        "title": "Hebcal Jerusalem",
        "items": [
            {
                "title": "Parashat Vayigash",
                "date": "2025-01-06",
                "category": "parashat",
                "leyning": {"torah": "Genesis 44:18-47:27", "haftarah": "Ezekiel 37:15-28"},
                "link": "https://hebcal.com/s/5785/11"
            },
            {
                "title": "Candle lighting: 16:21",
                "date": "2025-01-10T16:21:00+02:00",
                "category": "candles"
            },
            {
                "title": "Asara B'Tevet",
                "date": "2025-01-10",
                "category": "holiday",
                "subcat": "fast"
            },
            {
                "title": "Tu BiShvat",
                "date": "2025-01-10",
                "category": "holiday",
                "subcat": "major",
                "link": "https://hebcal.com/h/tu-bishvat-2025"
            },
            {
                "title": "Havdalah: 17:36",
                "date": "2025-01-11T17:36:00+02:00",
                "category": "havdalah"
            }
        ]
    })
    .to_string()
}

/// Place and calendar mocks shared by every scenario.
async fn mock_calendar(server: &mut ServerGuard) -> Vec<Mock> {
    let place = mock_json(
        server,
        "/data/reverse-geocode-client",
        Matcher::Any,
        json!({
            "city": "Jerusalem",
            "locality": "Jerusalem",
            "principalSubdivision": "Jerusalem District",
            "countryName": "Israel"
        })
        .to_string(),
    )
    .await;

    let events = mock_json(server, "/hebcal", Matcher::Any, calendar_body()).await;

    vec![place, events]
}

async fn mock_converter(server: &mut ServerGuard) -> Mock {
    mock_json(
        server,
        "/converter",
        Matcher::Any,
        json!({"gy": 2025, "gm": 1, "gd": 4, "hy": 5785, "hm": "Tevet", "hd": 4, "hebrew": "ד׳ בְּטֵבֵת תשפ״ה"})
            .to_string(),
    )
    .await
}

fn fresh(outcome: RefreshOutcome) -> DashboardSnapshot {
    match outcome {
        RefreshOutcome::Fresh(snapshot) => *snapshot,
        other => panic!("expected a fresh snapshot, got {other:?}"),
    }
}

fn gps_location() -> ResolvedLocation {
    ResolvedLocation {
        coordinates: jerusalem(),
        source: LocationSource::Gps,
        name: None,
        fallback_reason: None,
    }
}

#[tokio::test]
async fn before_the_holiday_it_is_listed_as_next() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, zmanim_body(4)).await;

    let snapshot = fresh(session(&server).refresh(jerusalem(), local(4, 12, 0)).await.unwrap());

    assert_eq!(snapshot.reference.effective_date, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
    let portion = snapshot.torah_portion.as_ref().unwrap();
    assert_eq!(portion.name, "Vayigash");
    assert_eq!(portion.torah.as_deref(), Some("Bereshit 44:18-47:27"));
    assert!(snapshot.holidays.current.is_none());
    let next = snapshot.holidays.next.as_ref().unwrap();
    assert_eq!(next.title, "Tu BiShvat");
    assert_eq!(
        snapshot.next_holiday_start,
        Some(Jerusalem.with_ymd_and_hms(2025, 1, 9, 18, 0, 0).unwrap())
    );
    assert_eq!(snapshot.hebrew_date.to_string(), "4 Tevet 5785");

    let text = render_dashboard(&snapshot, &gps_location(), &CountdownDisplay::default(), Locale::En);
    assert!(text.contains("Vayigash"));
    assert!(text.contains("No holiday today"));
    assert!(text.contains("Tu BiShvat, 10 January"));
    assert!(text.contains("Jerusalem, Jerusalem District"));
}

#[tokio::test]
async fn on_the_holiday_before_sunset_it_is_current() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, zmanim_body(10)).await;

    let snapshot = fresh(session(&server).refresh(jerusalem(), local(10, 10, 0)).await.unwrap());

    let current = snapshot.holidays.current.as_ref().unwrap();
    assert_eq!(current.title, "Tu BiShvat");
    assert_eq!(snapshot.theme, Some(HolidayTheme::MajorHoliday));
    assert!(snapshot.holidays.next.is_none());
    assert!(snapshot.torah_portion.is_none());
    assert!(!snapshot.shabbat_active);

    let candles = snapshot.candle_lighting.as_ref().unwrap();
    assert!(candles.from_sunset);
    assert_eq!(candles.target, Jerusalem.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap());

    let text = render_dashboard(&snapshot, &gps_location(), &CountdownDisplay::default(), Locale::Pt);
    assert!(text.contains("Festa Atual"));
    assert!(text.contains("Tu BiShvat"));
    assert!(text.contains("Verificar Sefer"));
}

#[tokio::test]
async fn after_sunset_the_hebrew_date_and_holiday_agree() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, zmanim_body(9)).await;
    let after_sundown = server
        .mock("GET", "/converter")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("gd".into(), "9".into()),
            Matcher::UrlEncoded("gs".into(), "on".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"hy": 5785, "hm": "Tevet", "hd": 10}).to_string())
        .expect(1)
        .create_async()
        .await;

    let snapshot = fresh(session(&server).refresh(jerusalem(), local(9, 19, 0)).await.unwrap());

    assert!(snapshot.reference.past_threshold);
    assert_eq!(snapshot.reference.effective_date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
    assert_eq!(snapshot.holidays.current.unwrap().title, "Tu BiShvat");
    assert_eq!(snapshot.hebrew_date.day, 10);
    after_sundown.assert_async().await;
}

#[tokio::test]
async fn sunset_is_re_requested_for_the_local_date() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let undated = server
        .mock("GET", "/zmanim")
        .match_query(Matcher::Regex("^cfg=json&latitude=[^&]+&longitude=[^&]+$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(zmanim_body(4))
        .expect(1)
        .create_async()
        .await;
    let dated = server
        .mock("GET", "/zmanim")
        .match_query(Matcher::UrlEncoded("date".into(), "2025-01-05".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(zmanim_body(5))
        .expect(1)
        .create_async()
        .await;

    // 01:00 in Jerusalem is still the 4th in UTC.
    let snapshot = fresh(session(&server).refresh(jerusalem(), local(5, 1, 0)).await.unwrap());

    assert_eq!(snapshot.reference.today, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
    assert_eq!(
        snapshot.sunset(),
        Some(Jerusalem.with_ymd_and_hms(2025, 1, 5, 18, 0, 0).unwrap())
    );
    undated.assert_async().await;
    dated.assert_async().await;
}

#[tokio::test]
async fn an_overtaken_refresh_is_discarded() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, zmanim_body(4)).await;
    let session = session(&server);

    let (first, second) = tokio::join!(
        session.refresh(jerusalem(), local(4, 12, 0)),
        session.refresh(jerusalem(), local(4, 12, 0)),
    );

    assert_eq!(
        first.unwrap(),
        RefreshOutcome::Superseded {
            ticket: 1,
            latest: 2
        }
    );
    assert_eq!(fresh(second.unwrap()).ticket, 2);
}

#[tokio::test]
async fn effective_date_never_moves_backwards_for_a_location() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, zmanim_body(9)).await;
    let session = session(&server);

    let evening = fresh(session.refresh(jerusalem(), local(9, 19, 0)).await.unwrap());
    assert_eq!(evening.reference.effective_date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());

    // A clock that steps back before sunset must not undo the rollover.
    let earlier = fresh(session.refresh(jerusalem(), local(9, 17, 59)).await.unwrap());
    assert_eq!(earlier.reference.effective_date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
}

#[tokio::test]
async fn failing_service_aborts_the_refresh() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = server
        .mock("GET", "/zmanim")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let err = session(&server)
        .refresh(jerusalem(), local(4, 12, 0))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert!(matches!(
        err,
        DashboardError::ServiceUnavailable {
            service: "hebcal",
            status: 503
        }
    ));
}

#[tokio::test]
async fn unreachable_services_report_network_errors() {
    let services = Services::new(ServiceEndpoints::all_at("http://127.0.0.1:9")).unwrap();
    let session = DashboardSession::new(services, DashboardSettings::default());

    let err = session.refresh(jerusalem(), local(4, 12, 0)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn malformed_payloads_are_unexpected() {
    let mut server = Server::new_async().await;
    let _calendar = mock_calendar(&mut server).await;
    let _converter = mock_converter(&mut server).await;
    let _zmanim = mock_json(&mut server, "/zmanim", Matcher::Any, "<html>".to_string()).await;

    let err = session(&server)
        .refresh(jerusalem(), local(4, 12, 0))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[tokio::test]
async fn search_hits_are_persisted_and_misses_reported() {
    let mut server = Server::new_async().await;
    let dir = tempdir().unwrap();
    let store = CoordinateStore::new(dir.path().join("last_location.json"));
    let services = Services::new(ServiceEndpoints::all_at(&server.url())).unwrap();
    let preferences = LocationPreferences::default();

    let _hit = server
        .mock("GET", "/search")
        .match_query(Matcher::UrlEncoded("q".into(), "Safed".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"lat": "32.9646", "lon": "35.4960", "display_name": "Safed, Israel"}]).to_string())
        .create_async()
        .await;
    let _miss = server
        .mock("GET", "/search")
        .match_query(Matcher::UrlEncoded("q".into(), "Atlantis".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let found = search_location(&services, "  Safed ", &store, &preferences)
        .await
        .unwrap();
    assert_eq!(found.source, LocationSource::Search);
    assert_eq!(found.name.as_deref(), Some("Safed, Israel"));
    assert_eq!(store.load().unwrap().name.as_deref(), Some("Safed, Israel"));

    let missing = search_location(&services, "Atlantis", &store, &preferences)
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let empty = search_location(&services, "   ", &store, &preferences)
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::EmptyQuery);
}

/// Wall clock that follows tokio's clock, paused or not.
struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(Instant::now() - self.started).unwrap()
    }
}

#[tokio::test]
async fn finished_countdown_refreshes_the_live_dashboard() {
    let mut server = Server::new_async().await;
    let _place = mock_json(
        &mut server,
        "/data/reverse-geocode-client",
        Matcher::Any,
        json!({"city": "Jerusalem", "countryName": "Israel"}).to_string(),
    )
    .await;
    let events = server
        .mock("GET", "/hebcal")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(calendar_body())
        .expect(2)
        .create_async()
        .await;
    let zmanim = server
        .mock("GET", "/zmanim")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(zmanim_body(8))
        .expect(2)
        .create_async()
        .await;
    let before_sundown = server
        .mock("GET", "/converter")
        .match_query(Matcher::Regex("strict=1$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"hy": 5785, "hm": "Tevet", "hd": 8}).to_string())
        .expect(1)
        .create_async()
        .await;
    let after_sundown = server
        .mock("GET", "/converter")
        .match_query(Matcher::UrlEncoded("gs".into(), "on".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"hy": 5785, "hm": "Tevet", "hd": 9}).to_string())
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let mut config = FileConfig::default();
    config.services = ServiceEndpoints::all_at(&server.url());
    config.calendar.refresh_delay_secs = 1;
    config.location.store_path = Some(dir.path().join("last.json").to_string_lossy().into_owned());

    // Ten seconds before sunset on a Wednesday.
    let clock = Arc::new(TokioClock {
        base: Jerusalem
            .with_ymd_and_hms(2025, 1, 8, 17, 59, 50)
            .unwrap()
            .with_timezone(&Utc),
        started: Instant::now(),
    });
    let (tx, mut frames) = mpsc::unbounded_channel();
    let countdowns = Countdowns::new(clock.clone(), tx, config.calendar.refresh_delay());
    let services = Services::new(config.services.clone()).unwrap();
    let session = DashboardSession::new(services, DashboardSettings::from(&config));
    let mut live = LiveDashboard::new(
        session,
        &config,
        Arc::new(FixedPosition(jerusalem())),
        clock,
        countdowns,
    );

    live.relocate().await.unwrap();
    let first = live.snapshot().unwrap();
    assert!(!first.reference.past_threshold);
    assert_eq!(first.hebrew_date.day, 8);
    assert!(live.countdowns().is_active(CountdownKind::DayRollover));
    assert!(live.countdowns().is_active(CountdownKind::ShabbatCandles));

    let stale = CountdownFrame {
        kind: CountdownKind::ShabbatCandles,
        generation: 999,
        tick: CountdownTick::Elapsed,
    };
    assert_eq!(live.on_frame(&stale).await.unwrap(), FrameStep::Stale);

    // Let the timers run on paused time; the HTTP round trip runs on real time.
    tokio::time::pause();
    let mut refreshed = false;
    while let Some(frame) = frames.recv().await {
        if frame.tick == CountdownTick::RefreshDue {
            tokio::time::resume();
        }
        let step = live.on_frame(&frame).await.unwrap();
        if step == FrameStep::Refreshed {
            assert_eq!(frame.kind, CountdownKind::DayRollover);
            refreshed = true;
            break;
        }
        assert_ne!(frame.tick, CountdownTick::RefreshDue);
    }
    assert!(refreshed);

    let after = live.snapshot().unwrap();
    assert!(after.reference.past_threshold);
    assert_eq!(after.reference.effective_date, NaiveDate::from_ymd_opt(2025, 1, 9).unwrap());
    assert_eq!(after.hebrew_date.day, 9);
    assert_eq!(live.location().unwrap().source, LocationSource::Gps);
    assert_eq!(
        live.countdowns()
            .handle(CountdownKind::DayRollover)
            .map(|handle| handle.target()),
        Some(Jerusalem.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap().with_timezone(&Utc))
    );

    zmanim.assert_async().await;
    events.assert_async().await;
    before_sundown.assert_async().await;
    after_sundown.assert_async().await;
}
