//! 5-day / 3-hour forecast lookup against OpenWeatherMap.
//!
//! Every failure surfaces to the user as a warning line rather than an error,
//! so `WeatherError`'s `Display` is the text shown in the UI.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The free forecast API only covers this many days ahead.
pub const MAX_FORECAST_DAYS: i64 = 5;

const CITY_MAPPING: &[(&str, &str)] = &[
    ("서울", "Seoul"),
    ("제주도", "Jeju"),
    ("제주", "Jeju"),
    ("부산", "Busan"),
    ("인천", "Incheon"),
    ("대구", "Daegu"),
    ("대전", "Daejeon"),
    ("광주", "Gwangju"),
    ("울산", "Ulsan"),
    ("강릉", "Gangneung"),
    ("경주", "Gyeongju"),
    ("전주", "Jeonju"),
    ("여수", "Yeosu"),
    ("도쿄", "Tokyo"),
    ("오사카", "Osaka"),
    ("대만", "Taipei"),
    ("LA", "Los Angeles"),
    ("뉴욕", "New York"),
    ("런던", "London"),
    ("파리", "Paris"),
    ("벤쿠버", "Vancouver"),
];

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("⚠️ 도시명을 입력해주세요.")]
    EmptyCity,
    #[error("⚠️ 날짜를 선택해주세요.")]
    MissingDate,
    #[error("⚠️ 오류 발생: {0}")]
    InvalidInput(String),
    #[error("⚠️ 과거 날짜/시간은 조회할 수 없습니다. 현재 이후를 선택해주세요.")]
    PastDate,
    #[error("⚠️ 5일 이내 날짜만 조회 가능합니다. 더 가까운 날짜를 선택해주세요.")]
    TooFar,
    #[error("⚠️ 날씨 API 키가 설정되지 않았습니다.")]
    MissingApiKey,
    #[error("⚠️ 날씨 정보를 가져올 수 없습니다. (도시: {0})")]
    Unavailable(String),
    #[error("⚠️ 해당 날짜의 예보를 찾을 수 없습니다.")]
    NoForecast,
    #[error("⚠️ 날씨 조회 중 오류 발생: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Condition {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Wind {
    pub speed: f64,
}

/// One timestamped record of the forecast list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ForecastEntry {
    /// Unix seconds.
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub wind: Wind,
    /// Probability of precipitation, 0..1.
    #[serde(default)]
    pub pop: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

/// Maps Korean city names to the English query the API understands.
/// Unknown names are passed through unchanged.
pub fn english_city_name(city: &str) -> &str {
    CITY_MAPPING
        .iter()
        .find(|(korean, _)| *korean == city)
        .map(|(_, english)| *english)
        .unwrap_or(city)
}

/// Returns the entry closest in time to `target` (unix seconds).
/// On ties the earlier entry in the list wins.
pub fn nearest_forecast(target: i64, entries: &[ForecastEntry]) -> Option<&ForecastEntry> {
    let mut best: Option<(&ForecastEntry, i64)> = None;
    for entry in entries {
        let diff = (entry.dt - target).abs();
        if best.map_or(true, |(_, min)| diff < min) {
            best = Some((entry, diff));
        }
    }
    best.map(|(entry, _)| entry)
}

pub fn travel_tip(temp: f64) -> &'static str {
    if temp < 5.0 {
        "추운 날씨가 예상됩니다. 따뜻한 옷을 챙기세요! 🧥"
    } else if temp < 15.0 {
        "쌀쌀한 날씨가 예상됩니다. 가벼운 외투를 준비하세요. 🧥"
    } else if temp < 25.0 {
        "여행하기 좋은 날씨가 예상됩니다! 😊"
    } else {
        "더운 날씨가 예상됩니다. 선크림과 물을 챙기세요! ☀️"
    }
}

/// Parses "12시" or "12" and applies 오전/오후 (or AM/PM) to a 24-hour value.
pub fn parse_hour(hour: &str, ampm: &str) -> Result<u32, WeatherError> {
    let raw = hour.trim().trim_end_matches('시').trim();
    let value: u32 = raw
        .parse()
        .map_err(|_| WeatherError::InvalidInput(format!("잘못된 시간 형식입니다: '{}'", hour)))?;
    if !(1..=12).contains(&value) {
        return Err(WeatherError::InvalidInput(format!(
            "시간은 1시부터 12시 사이여야 합니다: '{}'",
            hour
        )));
    }

    let pm = match ampm.trim() {
        "오후" | "PM" | "pm" => true,
        "오전" | "AM" | "am" => false,
        other => {
            return Err(WeatherError::InvalidInput(format!(
                "오전/오후 값이 올바르지 않습니다: '{}'",
                other
            )))
        }
    };

    Ok(match (pm, value) {
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, 12) => 0,
        (false, h) => h,
    })
}

/// Combines the picked date and hour, rejecting instants in the past or
/// beyond the forecast window.
pub fn forecast_target(
    date: NaiveDate,
    hour: &str,
    ampm: &str,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, WeatherError> {
    let hour = parse_hour(hour, ampm)?;
    let target = date
        .and_hms_opt(hour, 0, 0)
        .ok_or_else(|| WeatherError::InvalidInput(format!("잘못된 시간: {}", hour)))?;

    let diff = target - now;
    let hours_diff = diff.num_seconds() as f64 / 3600.0;
    let days_diff = diff.num_days();

    if hours_diff < 0.0 {
        return Err(WeatherError::PastDate);
    }
    if days_diff > MAX_FORECAST_DAYS {
        return Err(WeatherError::TooFar);
    }
    Ok(target)
}

fn local_timestamp(target: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&target)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| target.and_utc().timestamp())
}

fn local_time_label(dt: i64) -> String {
    match Local.timestamp_opt(dt, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => DateTime::from_timestamp(dt, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
    }
}

/// Markdown report for one forecast entry, followed by a clothing tip and,
/// when rain is likely, an umbrella reminder.
pub fn format_report(city: &str, time_label: &str, entry: &ForecastEntry) -> String {
    let description = entry
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("-");
    let pop_percent = entry.pop * 100.0;

    let mut report = format!(
        "### 🌤️ {city} 날씨 예보\n\n\
📅 **예보 날짜**: {time_label}\n\n\
- **예상 기온**: {:.1}°C (체감 {:.1}°C)\n\
- **날씨**: {description}\n\
- **습도**: {}%\n\
- **풍속**: {:.1} m/s\n\
- **최저/최고**: {:.1}°C / {:.1}°C\n\
- **강수 확률**: {:.0}%\n\n\
💡 **여행 팁**: {}",
        entry.main.temp,
        entry.main.feels_like,
        entry.main.humidity,
        entry.wind.speed,
        entry.main.temp_min,
        entry.main.temp_max,
        pop_percent,
        travel_tip(entry.main.temp),
    );

    if entry.pop > 0.3 {
        report.push_str(&format!(
            "\n☔ 강수 확률이 {:.0}%입니다. 우산을 챙기세요!",
            pop_percent
        ));
    }
    report
}

#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build weather HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Fetches the forecast list for `city` and reports the entry nearest to `target`.
    #[instrument(skip(self))]
    pub async fn forecast(&self, city: &str, target: NaiveDateTime) -> Result<String, WeatherError> {
        if self.api_key.is_empty() {
            return Err(WeatherError::MissingApiKey);
        }

        let english = english_city_name(city);
        let url = format!("{}/forecast", self.base_url);
        debug!(%url, english, "Requesting forecast");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", english),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", "kr"),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), city, "Forecast request failed");
            return Err(WeatherError::Unavailable(city.to_string()));
        }

        let data: ForecastResponse = response.json().await?;
        let entry = nearest_forecast(local_timestamp(target), &data.list).ok_or(WeatherError::NoForecast)?;

        info!(city, dt = entry.dt, "Selected forecast entry");
        Ok(format_report(city, &local_time_label(entry.dt), entry))
    }

    /// Validates the weather tab's inputs against `now`, then looks up the forecast.
    pub async fn lookup(
        &self,
        city: &str,
        date: Option<NaiveDate>,
        hour: &str,
        ampm: &str,
        now: NaiveDateTime,
    ) -> Result<String, WeatherError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(WeatherError::EmptyCity);
        }
        let date = date.ok_or(WeatherError::MissingDate)?;
        let target = forecast_target(date, hour, ampm, now)?;
        self.forecast(city, target).await
    }

    /// The weather tab's search action: always yields text for the result pane.
    pub async fn check_weather(&self, city: &str, date: Option<NaiveDate>, hour: &str, ampm: &str) -> String {
        let now = Local::now().naive_local();
        self.lookup(city, date, hour, ampm, now)
            .await
            .unwrap_or_else(|e| e.to_string())
    }
}

/// Date preset used by the "today / tomorrow / day after" buttons.
pub fn quick_date(days_offset: i64, now: NaiveDateTime) -> NaiveDate {
    (now + chrono::Duration::days(days_offset)).date()
}

/// The last date the weather tab allows picking.
pub fn max_date(now: NaiveDateTime) -> NaiveDate {
    quick_date(MAX_FORECAST_DAYS, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dt: i64, temp: f64, pop: f64) -> ForecastEntry {
        ForecastEntry {
            dt,
            main: MainReadings {
                temp,
                feels_like: temp - 1.0,
                temp_min: temp - 2.0,
                temp_max: temp + 2.0,
                humidity: 60.0,
            },
            weather: vec![Condition {
                description: "맑음".to_string(),
            }],
            wind: Wind { speed: 3.25 },
            pop,
        }
    }

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_nearest_forecast_minimal_difference() {
        let entries = vec![entry(1000, 10.0, 0.0), entry(4000, 11.0, 0.0), entry(7000, 12.0, 0.0)];
        assert_eq!(nearest_forecast(3500, &entries).unwrap().dt, 4000);
        assert_eq!(nearest_forecast(0, &entries).unwrap().dt, 1000);
        assert_eq!(nearest_forecast(99_999, &entries).unwrap().dt, 7000);
    }

    #[test]
    fn test_nearest_forecast_tie_prefers_first() {
        let entries = vec![entry(1000, 10.0, 0.0), entry(3000, 11.0, 0.0)];
        assert_eq!(nearest_forecast(2000, &entries).unwrap().dt, 1000);
    }

    #[test]
    fn test_nearest_forecast_empty() {
        assert!(nearest_forecast(0, &[]).is_none());
    }

    #[test]
    fn test_city_mapping() {
        assert_eq!(english_city_name("제주도"), "Jeju");
        assert_eq!(english_city_name("LA"), "Los Angeles");
        assert_eq!(english_city_name("Berlin"), "Berlin");
    }

    #[test]
    fn test_parse_hour() {
        assert_eq!(parse_hour("12시", "오후").unwrap(), 12);
        assert_eq!(parse_hour("12시", "오전").unwrap(), 0);
        assert_eq!(parse_hour("3시", "오후").unwrap(), 15);
        assert_eq!(parse_hour("9", "AM").unwrap(), 9);
        assert!(matches!(parse_hour("열두시", "오후"), Err(WeatherError::InvalidInput(_))));
        assert!(matches!(parse_hour("13시", "오후"), Err(WeatherError::InvalidInput(_))));
    }

    #[test]
    fn test_forecast_target_past_date() {
        let now = at("2026-03-10", "15:30:00");
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let err = forecast_target(date, "12시", "오후", now).unwrap_err();
        assert!(matches!(err, WeatherError::PastDate));
        assert!(err.to_string().contains("과거 날짜/시간은 조회할 수 없습니다"));
    }

    #[test]
    fn test_forecast_target_too_far() {
        let now = at("2026-03-10", "09:00:00");
        let date = NaiveDate::from_ymd_opt(2026, 3, 16).unwrap();
        let err = forecast_target(date, "12시", "오후", now).unwrap_err();
        assert!(matches!(err, WeatherError::TooFar));
        assert!(err.to_string().contains("5일 이내"));
    }

    #[test]
    fn test_forecast_target_within_window() {
        let now = at("2026-03-10", "09:00:00");
        // Five days and three hours ahead still counts as five whole days.
        let date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let target = forecast_target(date, "12시", "오후", now).unwrap();
        assert_eq!(target, at("2026-03-15", "12:00:00"));
    }

    #[test]
    fn test_travel_tip_thresholds() {
        assert!(travel_tip(-3.0).contains("추운"));
        assert!(travel_tip(5.0).contains("쌀쌀한"));
        assert!(travel_tip(15.0).contains("여행하기 좋은"));
        assert!(travel_tip(25.0).contains("더운"));
    }

    #[test]
    fn test_format_report() {
        let report = format_report("서울", "2026-03-11 12:00", &entry(0, 18.26, 0.45));
        assert!(report.starts_with("### 🌤️ 서울 날씨 예보"));
        assert!(report.contains("📅 **예보 날짜**: 2026-03-11 12:00"));
        assert!(report.contains("**예상 기온**: 18.3°C (체감 17.3°C)"));
        assert!(report.contains("**풍속**: 3.2 m/s") || report.contains("**풍속**: 3.3 m/s"));
        assert!(report.contains("**강수 확률**: 45%"));
        assert!(report.contains("여행하기 좋은 날씨"));
        assert!(report.contains("☔ 강수 확률이 45%입니다. 우산을 챙기세요!"));
    }

    #[test]
    fn test_format_report_dry_day_has_no_umbrella() {
        let report = format_report("Paris", "x", &entry(0, 2.0, 0.3));
        assert!(!report.contains("☔"));
        assert!(report.contains("추운 날씨"));
    }

    #[test]
    fn test_quick_date() {
        let now = at("2026-12-31", "23:00:00");
        assert_eq!(quick_date(1, now), NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert_eq!(max_date(now), NaiveDate::from_ymd_opt(2027, 1, 5).unwrap());
    }

    #[tokio::test]
    async fn test_lookup_validates_before_network() {
        let client = WeatherClient::new("http://127.0.0.1:9", "").unwrap();
        let now = at("2026-03-10", "09:00:00");

        let err = client.lookup("  ", None, "12시", "오후", now).await.unwrap_err();
        assert!(matches!(err, WeatherError::EmptyCity));

        let err = client.lookup("서울", None, "12시", "오후", now).await.unwrap_err();
        assert!(matches!(err, WeatherError::MissingDate));

        let date = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        let err = client.lookup("서울", Some(date), "12시", "오후", now).await.unwrap_err();
        assert!(matches!(err, WeatherError::MissingApiKey));
    }
}
