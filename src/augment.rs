//! Keyword-triggered additions to assistant responses.
//!
//! Budget and checklist blocks are triggered by the user's message; the map
//! link is triggered by city names in the response itself.

const BUDGET_KEYWORDS: &[&str] = &["예산", "비용", "경비", "돈", "얼마"];
const CHECKLIST_KEYWORDS: &[&str] = &["준비", "챙겨", "필요", "체크리스트", "준비물"];

/// Scanned in order; only the first match gets a link.
const MAP_LOCATIONS: &[(&str, &str)] = &[
    ("서울", "Seoul"),
    ("부산", "Busan"),
    ("제주", "Jeju"),
    ("경주", "Gyeongju"),
    ("강릉", "Gangneung"),
    ("전주", "Jeonju"),
    ("여수", "Yeosu"),
];

const BUDGET_BLOCK: &str = "\n\n---\n### 💰 예산 계산 가이드\n\n\
**국내 여행 기준 (1인당)**\n\
- 🏨 숙박: 5만원~15만원/박\n\
- 🍽️ 식비: 3만원~5만원/일\n\
- 🚗 교통: 지역별 상이\n\
- 🎫 관광지: 1만원~3만원/일\n\
- 🛍️ 기타: 2만원~5만원/일\n";

const CHECKLIST_BLOCK: &str = "\n\n---\n### ✅ 여행 준비 체크리스트\n\n\
**필수 준비물**\n\
- [ ] 신분증/여권\n\
- [ ] 숙박 예약 확인서\n\
- [ ] 교통편 예약\n\
- [ ] 현금/카드\n\
- [ ] 충전기/보조배터리\n\n\
**선택 준비물**\n\
- [ ] 여행자 보험\n\
- [ ] 상비약\n\
- [ ] 우산/선크림\n\
- [ ] 카메라\n";

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

pub fn add_budget_guide(message: &str, mut response: String) -> String {
    if mentions_any(message, BUDGET_KEYWORDS) {
        response.push_str(BUDGET_BLOCK);
    }
    response
}

pub fn add_checklist(message: &str, mut response: String) -> String {
    if mentions_any(message, CHECKLIST_KEYWORDS) {
        response.push_str(CHECKLIST_BLOCK);
    }
    response
}

pub fn add_map_link(mut response: String) -> String {
    if let Some((korean, english)) = MAP_LOCATIONS.iter().find(|(k, _)| response.contains(k)) {
        response.push_str(&format!(
            "\n\n🗺️ [{} Google Maps에서 보기](https://maps.google.com/?q={}+Korea)",
            korean, english
        ));
    }
    response
}

/// Runs every augmenter over a finished response.
pub fn apply_all(message: &str, response: String) -> String {
    let response = add_budget_guide(message, response);
    let response = add_checklist(message, response);
    add_map_link(response)
}
