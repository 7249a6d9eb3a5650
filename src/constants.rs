// Constants, loaded from the environment where a deployment may want to override them.

use std::env;

// Use lazy_static to initialize static variables safely.
lazy_static::lazy_static! {
    pub static ref OPENAI_API_KEY: String = env::var("OPENAI_API_KEY").unwrap_or_default();
    pub static ref OPENAI_BASE_URL: String = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    pub static ref OPENWEATHER_API_KEY: String = env::var("OPENWEATHER_API_KEY").unwrap_or_default();
    pub static ref OPENWEATHER_BASE_URL: String = env::var("OPENWEATHER_BASE_URL").unwrap_or_else(|_| "http://api.openweathermap.org/data/2.5".to_string());
    pub static ref EXPORT_DIR: String = env::var("TRAVEL_EXPORT_DIR").unwrap_or_else(|_| "exports".to_string());
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7863;

pub const APP_TITLE: &str = "🌍 여행 계획 어시스턴트";

/// Destinations offered by the chat tab's dropdown.
pub const POPULAR_DESTINATIONS: &[&str] = &[
    "서울", "제주도", "도쿄", "대만", "LA", "뉴욕", "런던", "파리", "벤쿠버", "오사카",
];

/// Quick-select buttons on the weather tab.
pub const WEATHER_QUICK_CITIES: &[&str] = &["서울", "제주도", "도쿄", "파리", "뉴욕", "런던"];

pub const QUICK_QUESTIONS: &[&str] = &[
    "🍽️ 근처 맛집 리스트 찾기",
    "💰 여행지 예상 비용",
    "🚗 여행지 가는 방법",
];
