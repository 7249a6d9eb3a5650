use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used in exported documents.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "사용자",
            Role::Assistant => "AI 어시스턴트",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Keywords counted over the user's messages for the statistics tab.
/// `예산` also counts mentions of `비용`.
const STAT_KEYWORDS: &[(&str, &[&str])] = &[
    ("제주", &["제주"]),
    ("부산", &["부산"]),
    ("서울", &["서울"]),
    ("예산", &["예산", "비용"]),
];

pub const EMPTY_CHART: &str = "아직 대화 데이터가 없습니다.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub keywords: Vec<(String, usize)>,
    pub chart: String,
}

/// The ordered, append-only message list of one chat session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn keyword_counts(&self) -> Vec<(String, usize)> {
        let all_text = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        STAT_KEYWORDS
            .iter()
            .map(|(label, needles)| {
                let count = needles.iter().map(|n| all_text.matches(n).count()).sum();
                (label.to_string(), count)
            })
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        let keywords = self.keyword_counts();
        SessionStats {
            total: self.len(),
            user: self.count(Role::User),
            assistant: self.count(Role::Assistant),
            chart: keyword_chart(&keywords),
            keywords,
        }
    }
}

/// Renders keyword counts as a markdown bar chart.
pub fn keyword_chart(keywords: &[(String, usize)]) -> String {
    if keywords.iter().all(|(_, count)| *count == 0) {
        return EMPTY_CHART.to_string();
    }

    let mut chart = String::from("### 📊 언급된 키워드\n\n");
    for (key, count) in keywords.iter().filter(|(_, count)| *count > 0) {
        chart.push_str(&format!("**{}**: {} ({}회)\n", key, "█".repeat(*count), count));
    }
    chart
}
