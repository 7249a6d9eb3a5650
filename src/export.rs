//! Conversation export: a PDF when it renders, a UTF-8 text file otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

use crate::conversation::Message;
use crate::pdf::{self, Block};

pub const DEFAULT_TRUNCATE_LEN: usize = 5000;
pub const TRUNCATION_MARKER: &str = "... (내용이 너무 길어 생략됨)";

const FILE_PREFIX: &str = "여행계획";
const DOCUMENT_TITLE: &str = "여행 계획 대화 내용";

// Spacer heights in points (0.3, 0.2 and 0.1 inch).
const AFTER_HEADER: f32 = 21.6;
const AFTER_MESSAGE: f32 = 14.4;
const AFTER_RULE: f32 = 7.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub format: ExportFormat,
}

impl ExportedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Prepares message text for the PDF paragraph markup: drops markdown
/// symbols, escapes `&`, `<`, `>`, turns newlines into `<br/>` and caps the
/// result at `limit` characters followed by [`TRUNCATION_MARKER`].
pub fn paragraph_markup(content: &str, limit: usize) -> String {
    let stripped: String = content
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`' | '\r'))
        .collect();
    let markup = stripped
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br/>");

    if markup.chars().count() <= limit {
        return markup;
    }

    let mut cut: String = markup.chars().take(limit).collect();
    // Never leave half an entity or half a line break at the cut.
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    if let Some(lt) = cut.rfind('<') {
        if !cut[lt..].contains('>') {
            cut.truncate(lt);
        }
    }
    cut.push_str(TRUNCATION_MARKER);
    cut
}

fn document_blocks(history: &[Message], now: NaiveDateTime, limit: usize) -> Vec<Block> {
    let mut blocks = vec![
        Block::Title(DOCUMENT_TITLE.to_string()),
        Block::Paragraph(format!("생성 시간: {}", now.format("%Y-%m-%d %H:%M:%S"))),
        Block::Spacer(AFTER_HEADER),
    ];

    for (i, msg) in history.iter().enumerate() {
        blocks.push(Block::Label(format!("{}:", msg.role.label())));
        blocks.push(Block::Paragraph(paragraph_markup(&msg.content, limit)));
        blocks.push(Block::Spacer(AFTER_MESSAGE));

        if i + 1 < history.len() {
            blocks.push(Block::Paragraph("_".repeat(80)));
            blocks.push(Block::Spacer(AFTER_RULE));
        }
    }
    blocks
}

/// Plain-text rendition used when the PDF cannot be produced.
pub fn text_document(history: &[Message], now: NaiveDateTime) -> String {
    let rule = "=".repeat(50);
    let mut content = format!(
        "{rule}\n{DOCUMENT_TITLE}\n생성 시간: {}\n{rule}\n\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    for msg in history {
        content.push_str(&format!("{}:\n{}\n\n", msg.role.label(), msg.content));
        content.push_str(&"-".repeat(50));
        content.push_str("\n\n");
    }
    content
}

fn file_stem(now: NaiveDateTime) -> String {
    format!("{}_{}", FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Writes the conversation to `dir`. Returns `None` for an empty history.
pub fn export_conversation(history: &[Message], dir: &Path, now: NaiveDateTime) -> Result<Option<ExportedFile>> {
    export_with_limit(history, dir, now, DEFAULT_TRUNCATE_LEN)
}

pub fn export_with_limit(
    history: &[Message],
    dir: &Path,
    now: NaiveDateTime,
    limit: usize,
) -> Result<Option<ExportedFile>> {
    if history.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(dir).context(format!("Failed to create export directory {}", dir.display()))?;
    let stem = file_stem(now);

    let pdf_path = dir.join(format!("{}.pdf", stem));
    let pdf_result = pdf::render(&document_blocks(history, now, limit))
        .and_then(|bytes| fs::write(&pdf_path, bytes).context(format!("Failed to write {}", pdf_path.display())));

    match pdf_result {
        Ok(()) => {
            info!(path = %pdf_path.display(), "Exported conversation as PDF");
            Ok(Some(ExportedFile {
                path: pdf_path,
                format: ExportFormat::Pdf,
            }))
        }
        Err(e) => {
            error!("PDF export failed, falling back to text: {:?}", e);
            let txt_path = dir.join(format!("{}.txt", stem));
            fs::write(&txt_path, text_document(history, now))
                .context(format!("Failed to write {}", txt_path.display()))?;
            info!(path = %txt_path.display(), "Exported conversation as text");
            Ok(Some(ExportedFile {
                path: txt_path,
                format: ExportFormat::Text,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2026-05-01 09:08:07", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_paragraph_markup_strips_and_escapes() {
        let markup = paragraph_markup("## 일정\n**A & B** <tip>\n`code`", 100);
        assert_eq!(markup, " 일정<br/>A &amp; B &lt;tip&gt;<br/>code");
    }

    #[test]
    fn test_paragraph_markup_crlf() {
        assert_eq!(paragraph_markup("1일차\r\n2일차", 100), "1일차<br/>2일차");
    }

    #[test]
    fn test_paragraph_markup_short_text_untouched() {
        assert_eq!(paragraph_markup("abc", 3), "abc");
    }

    #[test]
    fn test_paragraph_markup_truncates() {
        let content = "가".repeat(6000);
        let markup = paragraph_markup(&content, DEFAULT_TRUNCATE_LEN);
        let body = markup.strip_suffix(TRUNCATION_MARKER).unwrap();
        assert_eq!(body.chars().count(), DEFAULT_TRUNCATE_LEN);
    }

    #[test]
    fn test_paragraph_markup_escapes_before_truncating() {
        // "&" expands to "&amp;" first, so the cut falls inside the entity and backs off.
        let markup = paragraph_markup("abcd&efg", 6);
        assert_eq!(markup, format!("abcd{}", TRUNCATION_MARKER));

        let markup = paragraph_markup("a\nbcdefgh", 4);
        assert_eq!(markup, format!("a{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_text_document_layout() {
        let history = vec![Message::user("# 질문"), Message::assistant("답변")];
        let text = text_document(&history, now());
        let expected = format!(
            "{eq}\n여행 계획 대화 내용\n생성 시간: 2026-05-01 09:08:07\n{eq}\n\n\
사용자:\n# 질문\n\n{dash}\n\nAI 어시스턴트:\n답변\n\n{dash}\n\n",
            eq = "=".repeat(50),
            dash = "-".repeat(50)
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_document_blocks_separators() {
        let history = vec![Message::user("a"), Message::assistant("b")];
        let blocks = document_blocks(&history, now(), 100);
        let rules = blocks
            .iter()
            .filter(|b| matches!(b, Block::Paragraph(p) if p == &"_".repeat(80)))
            .count();
        assert_eq!(rules, 1);
        assert_eq!(blocks[0], Block::Title(DOCUMENT_TITLE.to_string()));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(now()), "여행계획_20260501_090807");
    }
}
