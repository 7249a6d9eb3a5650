//! Korean travel-planning chat assistant: streamed LLM answers, weather
//! forecasts, conversation statistics and PDF export behind a local web UI.

pub mod augment;
pub mod chat;
pub mod constants;
pub mod conversation;
pub mod export;
pub mod llm_interaction;
pub mod pdf;
pub mod quick_prompts;
pub mod settings;
pub mod weather;
pub mod web_server;
