//! Prompt builders behind the chat tab's destination and quick-question dropdowns.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Restaurants,
    Cost,
    Directions,
}

#[derive(Debug, Error, PartialEq)]
pub enum QuickPromptError {
    #[error("빠른 질문을 선택해주세요!")]
    NoQuestion,
}

impl QuestionKind {
    /// Recognizes the dropdown entry by its keyword ("맛집", "비용", "방법").
    pub fn from_label(label: &str) -> Option<Self> {
        if label.contains("맛집") {
            Some(Self::Restaurants)
        } else if label.contains("비용") {
            Some(Self::Cost)
        } else if label.contains("방법") {
            Some(Self::Directions)
        } else {
            None
        }
    }
}

/// Destinations reached from Seoul get "from Seoul" directions.
const DOMESTIC_FROM_SEOUL: &[&str] = &["서울", "제주도"];

/// Prompt for the destination dropdown alone.
pub fn destination_prompt(destination: Option<&str>) -> String {
    match destination.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => format!("{} 2박 3일 여행 계획 짜줘", d),
        None => String::new(),
    }
}

pub fn create_quick_prompt(destination: Option<&str>, kind: QuestionKind) -> String {
    match (destination.map(str::trim).filter(|d| !d.is_empty()), kind) {
        (None, QuestionKind::Restaurants) => "근처 맛집 리스트 알려줘".to_string(),
        (None, QuestionKind::Cost) => "여행 예상 비용 알려줘".to_string(),
        (None, QuestionKind::Directions) => "가는 방법 알려줘".to_string(),
        (Some(d), QuestionKind::Restaurants) => format!("{} 근처 맛집 리스트 알려줘", d),
        (Some(d), QuestionKind::Cost) => format!("{} 여행 예상 비용 알려줘", d),
        (Some(d), QuestionKind::Directions) if DOMESTIC_FROM_SEOUL.contains(&d) => {
            format!("서울에서 {} 가는 방법 알려줘", d)
        }
        (Some(d), QuestionKind::Directions) => format!("{} 가는 방법 알려줘", d),
    }
}

/// The "apply" button: combines the selected destination with the selected
/// quick question. An unrecognized question yields an empty prompt.
pub fn apply_quick_question(destination: Option<&str>, question: Option<&str>) -> Result<String, QuickPromptError> {
    let question = question
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(QuickPromptError::NoQuestion)?;

    Ok(QuestionKind::from_label(question)
        .map(|kind| create_quick_prompt(destination, kind))
        .unwrap_or_default())
}
