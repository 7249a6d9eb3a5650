// Chat turn handling shared by the web UI and the interactive terminal session.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::augment;
use crate::conversation::{Conversation, Message};
use crate::export;
use crate::llm_interaction::{build_request, LlmClient, LlmEvent};
use crate::settings::Settings;

/// One user's conversation plus the model settings it is answered with.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub conversation: Conversation,
    pub settings: Settings,
}

impl ChatSession {
    pub fn new(settings: Settings) -> Self {
        Self {
            conversation: Conversation::new(),
            settings,
        }
    }
}

/// Streams an answer to `user_input`. Every received delta sends the whole
/// text accumulated so far to `partials`; once the stream ends the
/// augmenters run and the final text is sent and returned.
pub async fn answer_stream(
    client: &LlmClient,
    settings: &Settings,
    history: &[Message],
    user_input: &str,
    partials: mpsc::Sender<String>,
) -> Result<String> {
    let request = build_request(settings, history, user_input);
    let (tx, mut rx) = mpsc::channel(64);

    let llm = client.clone();
    let handle = tokio::spawn(async move { llm.stream_chat(request, tx).await });

    let mut full_response = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            LlmEvent::Delta(text) => {
                full_response.push_str(&text);
                let _ = partials.send(full_response.clone()).await;
            }
            LlmEvent::Done => break,
            LlmEvent::Error(e) => warn!("Chat completion stream reported an error: {}", e),
        }
    }

    handle.await.context("Chat completion task panicked")??;

    let full_response = augment::apply_all(user_input, full_response);
    let _ = partials.send(full_response.clone()).await;
    Ok(full_response)
}

const HELP: &str = "명령어: /stats 통계, /export 내보내기, /clear 초기화, /settings 설정 보기, /quit 종료";

/// Interactive terminal chat with streamed output.
pub async fn run_terminal_chat(client: LlmClient, settings: Settings, export_dir: PathBuf) -> Result<()> {
    info!("Starting terminal chat session...");
    let mut session = ChatSession::new(settings);

    println!("🌍 여행 계획 어시스턴트 ({})", session.settings.model);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n👤 > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/settings" => println!(
                "모델: {}, 창의성: {}, 최대 응답 길이: {}",
                session.settings.model, session.settings.temperature, session.settings.max_tokens
            ),
            "/stats" => {
                let stats = session.conversation.stats();
                println!(
                    "💬 {}  👤 {}  🤖 {}\n{}",
                    stats.total, stats.user, stats.assistant, stats.chart
                );
            }
            "/clear" => {
                session.conversation.clear();
                println!("✅ 대화가 초기화되었습니다.");
            }
            "/export" => {
                let now = Local::now().naive_local();
                match export::export_conversation(session.conversation.messages(), &export_dir, now)? {
                    Some(file) => println!("📥 저장됨: {}", file.path.display()),
                    None => println!("⚠️ 저장할 대화가 없습니다."),
                }
            }
            _ => {
                let history = session.conversation.messages().to_vec();
                session.conversation.push(Message::user(input));

                let (tx, mut rx) = mpsc::channel::<String>(64);
                let printer = tokio::spawn(async move {
                    let mut printed = 0;
                    print!("🤖 ");
                    while let Some(text) = rx.recv().await {
                        if let Some(new) = text.get(printed..) {
                            print!("{}", new);
                            let _ = std::io::stdout().flush();
                        }
                        printed = text.len();
                    }
                    println!();
                });

                let result = answer_stream(&client, &session.settings, &history, input, tx).await;
                let _ = printer.await;

                match result {
                    Ok(answer) => session.conversation.push(Message::assistant(answer)),
                    Err(e) => println!("⚠️ 응답 생성 중 오류 발생: {:#}", e),
                }
            }
        }
    }

    info!("Terminal chat session finished.");
    Ok(())
}
