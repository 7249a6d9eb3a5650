use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::json;
use travel_planner::weather::{WeatherClient, WeatherError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn timestamp(t: NaiveDateTime) -> i64 {
    Local.from_local_datetime(&t).earliest().unwrap().timestamp()
}

fn entry(dt: i64, temp: f64, pop: f64) -> serde_json::Value {
    json!({
        "dt": dt,
        "main": {
            "temp": temp,
            "feels_like": temp - 1.0,
            "temp_min": temp - 2.0,
            "temp_max": temp + 2.0,
            "humidity": 60
        },
        "weather": [{ "description": "맑음" }],
        "wind": { "speed": 3.2 },
        "pop": pop
    })
}

#[test_log::test(tokio::test)]
async fn test_forecast_picks_nearest_entry() {
    let mock_server = MockServer::start().await;
    let t = timestamp(target());

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", "Seoul"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "metric"))
        .and(query_param("lang", "kr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [
                entry(t - 3 * 3600, 10.0, 0.0),
                entry(t + 3600, 21.5, 0.6),
                entry(t + 4 * 3600, 30.0, 0.0),
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "test-key").unwrap();
    let report = client.forecast("서울", target()).await.unwrap();

    assert!(report.contains("서울 날씨 예보"));
    assert!(report.contains("21.5°C"));
    assert!(report.contains("우산을 챙기세요"));
    assert!(!report.contains("30.0°C (체감"));
}

#[tokio::test]
async fn test_forecast_non_200_is_unavailable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "cod": "404" })))
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "test-key").unwrap();
    let err = client.forecast("아틀란티스", target()).await.unwrap_err();

    assert!(matches!(err, WeatherError::Unavailable(ref city) if city == "아틀란티스"));
    assert_eq!(err.to_string(), "⚠️ 날씨 정보를 가져올 수 없습니다. (도시: 아틀란티스)");
}

#[tokio::test]
async fn test_forecast_empty_list() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [] })))
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "test-key").unwrap();
    let err = client.forecast("도쿄", target()).await.unwrap_err();
    assert!(matches!(err, WeatherError::NoForecast));
}

#[tokio::test]
async fn test_malformed_body_is_request_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": [{ "dt": 1 }] })))
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "test-key").unwrap();
    let err = client.forecast("파리", target()).await.unwrap_err();

    assert!(matches!(err, WeatherError::Request(_)));
    assert!(err.to_string().starts_with("⚠️ 날씨 조회 중 오류 발생:"));
}

#[tokio::test]
async fn test_missing_api_key_skips_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "").unwrap();
    let err = client.forecast("서울", target()).await.unwrap_err();
    assert!(matches!(err, WeatherError::MissingApiKey));
}

#[tokio::test]
async fn test_lookup_validates_before_requesting() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = WeatherClient::new(mock_server.uri(), "test-key").unwrap();
    let now = target();

    let err = client.lookup("  ", Some(now.date()), "12시", "오후", now).await.unwrap_err();
    assert!(matches!(err, WeatherError::EmptyCity));

    let err = client.lookup("서울", None, "12시", "오후", now).await.unwrap_err();
    assert!(matches!(err, WeatherError::MissingDate));

    let yesterday = now.date().pred_opt().unwrap();
    let err = client.lookup("서울", Some(yesterday), "12시", "오후", now).await.unwrap_err();
    assert!(matches!(err, WeatherError::PastDate));

    let far = now.date() + chrono::Duration::days(7);
    let err = client.lookup("서울", Some(far), "12시", "오후", now).await.unwrap_err();
    assert!(matches!(err, WeatherError::TooFar));
}

#[tokio::test]
async fn test_check_weather_returns_warning_text() {
    let client = WeatherClient::new("http://127.0.0.1:9", "test-key").unwrap();
    let report = client.check_weather("", None, "12시", "오후").await;
    assert_eq!(report, "⚠️ 도시명을 입력해주세요.");
}
