use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::conversation::{Message, Role};
use crate::settings::Settings;

pub const SYSTEM_PROMPT: &str = "당신은 전문 여행 플래너 AI 어시스턴트입니다.

답변 시 다음 정보를 포함해주세요:
- 구체적인 장소와 추천 이유
- 시간대별 일정
- 예상 비용 (숙박, 식비, 교통, 입장료 등)
- 교통 수단 및 이동 시간
- 추천 맛집 및 특산물
- 여행 팁

답변은 친절하고 구체적으로, 마크다운 형식으로 작성해주세요.";

const PRESENCE_PENALTY: f32 = 0.3;
const FREQUENCY_PENALTY: f32 = 0.3;

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    Delta(String),
    Done,
    Error(String),
}

/// System prompt, then prior turns in order, then the new user input.
pub fn build_request(settings: &Settings, history: &[Message], user_input: &str) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: SYSTEM_PROMPT.to_string(),
    });
    for msg in history {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(ChatMessage {
            role: role.to_string(),
            content: msg.content.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: user_input.to_string(),
    });

    ChatRequest {
        model: settings.model.clone(),
        messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        presence_penalty: PRESENCE_PENALTY,
        frequency_penalty: FREQUENCY_PENALTY,
        stream: true,
    }
}

/// Outcome of feeding one SSE line to the parser.
#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

/// Removes every complete `\n`-terminated line from `buffer` and decodes it.
/// A trailing partial line (or partial UTF-8 sequence) stays buffered until
/// the rest arrives.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    lines
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            warn!("Failed to parse stream line: {} - Error: {}", data, e);
            SseLine::Skip
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Streams a chat completion, forwarding each content delta to `tx`.
    /// Bytes are buffered up to each newline, so a line (or a multi-byte
    /// character) split across network reads is still parsed whole.
    #[instrument(skip(self, request, tx), fields(model = %request.model, turns = request.messages.len()))]
    pub async fn stream_chat(&self, request: ChatRequest, tx: mpsc::Sender<LlmEvent>) -> Result<()> {
        if self.api_key.is_empty() {
            let msg = "OPENAI_API_KEY is not set".to_string();
            let _ = tx.send(LlmEvent::Error(msg.clone())).await;
            return Err(anyhow!(msg));
        }

        let url = format!("{}/chat/completions", self.base_url);
        info!(%url, "Requesting chat completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context(format!("Failed to send request to chat completion API at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Chat completion request failed");
            let msg = format!("Chat completion request failed with status {}: {}", status, error_body);
            let _ = tx.send(LlmEvent::Error(msg.clone())).await;
            return Err(anyhow!(msg));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Stream error: {}", e);
                    let _ = tx.send(LlmEvent::Error(e.to_string())).await;
                    return Err(anyhow!("Stream error: {}", e));
                }
            };
            buffer.extend_from_slice(&bytes);

            for line in drain_lines(&mut buffer) {
                match parse_sse_line(&line) {
                    SseLine::Delta(text) => {
                        if tx.send(LlmEvent::Delta(text)).await.is_err() {
                            debug!("Receiver dropped, abandoning stream");
                            return Ok(());
                        }
                    }
                    SseLine::Done => {
                        let _ = tx.send(LlmEvent::Done).await;
                        return Ok(());
                    }
                    SseLine::Skip => {}
                }
            }
        }

        // Body ended without [DONE]; flush whatever complete line is left.
        if let SseLine::Delta(text) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
            let _ = tx.send(LlmEvent::Delta(text)).await;
        }
        let _ = tx.send(LlmEvent::Done).await;
        Ok(())
    }
}
