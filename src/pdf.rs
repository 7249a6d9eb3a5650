//! Minimal paginated text renderer on top of `lopdf`.
//!
//! Text is set in the Adobe-Korea1 CID font `HYGoThic-Medium` through the
//! `UniKS-UCS2-H` CMap. The font is not embedded; viewers substitute their
//! own Korean face, so the output stays small and needs no font file.

use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

const FONT_NAME: &str = "HYGoThic-Medium";
const FONT_ENCODING: &str = "UniKS-UCS2-H";

/// A unit of layout. Paragraph text uses the export markup: `&amp;`, `&lt;`,
/// `&gt;` escapes and `<br/>` line breaks.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Label(String),
    Paragraph(String),
    Spacer(f32),
}

struct Style {
    size: f32,
    leading: f32,
    space_after: f32,
}

const TITLE: Style = Style {
    size: 20.0,
    leading: 24.0,
    space_after: 30.0,
};
const LABEL: Style = Style {
    size: 11.0,
    leading: 14.0,
    space_after: 4.0,
};
const BODY: Style = Style {
    size: 10.0,
    leading: 14.0,
    space_after: 12.0,
};

/// Decodes paragraph markup back into display lines.
pub fn markup_lines(markup: &str) -> Vec<String> {
    markup
        .split("<br/>")
        .map(|line| line.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&"))
        .collect()
}

fn char_width(c: char, size: f32) -> f32 {
    // Hangul, CJK and other wide scripts take a full em; Latin about half.
    if c >= '\u{1100}' {
        size
    } else {
        size * 0.5
    }
}

/// Greedy wrap by estimated glyph width, breaking at the last space when
/// there is one on the line.
pub fn wrap_line(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Vec<char> = Vec::new();
    let mut width = 0.0;

    for c in text.chars() {
        let w = char_width(c, size);
        if width + w > max_width && !current.is_empty() {
            match current.iter().rposition(|ch| *ch == ' ') {
                Some(space) if space > 0 => {
                    let rest: Vec<char> = current.split_off(space + 1);
                    lines.push(current.iter().collect::<String>().trim_end().to_string());
                    current = rest;
                }
                _ => {
                    lines.push(current.iter().collect());
                    current = Vec::new();
                }
            }
            width = current.iter().map(|ch| char_width(*ch, size)).sum();
        }
        current.push(c);
        width += w;
    }
    lines.push(current.into_iter().collect());
    lines
}

/// UCS-2 big-endian bytes for the `UniKS-UCS2-H` CMap. Characters outside
/// the BMP have no UCS-2 code and become `?`.
fn encode_ucs2(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for c in text.chars() {
        let code = u16::try_from(c as u32).unwrap_or(u16::from(b'?'));
        bytes.extend_from_slice(&code.to_be_bytes());
    }
    bytes
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn advance(&mut self, amount: f32) {
        if self.y - amount < MARGIN {
            self.new_page();
        } else {
            self.y -= amount;
        }
    }

    fn text_line(&mut self, text: &str, size: f32, leading: f32) {
        if self.y - leading < MARGIN {
            self.new_page();
        }
        self.y -= leading;
        if text.is_empty() {
            return;
        }
        let y = self.y;
        if let Some(ops) = self.pages.last_mut() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
            ops.push(Operation::new("Td", vec![MARGIN.into(), y.into()]));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_ucs2(text), StringFormat::Hexadecimal)],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
    }

    fn block(&mut self, lines: &[String], style: &Style) {
        let max_width = PAGE_WIDTH - 2.0 * MARGIN;
        for line in lines {
            for wrapped in wrap_line(line, style.size, max_width) {
                self.text_line(&wrapped, style.size, style.leading);
            }
        }
        self.advance(style.space_after);
    }
}

/// Lays out `blocks` on A4 pages and returns the serialized PDF.
pub fn render(blocks: &[Block]) -> Result<Vec<u8>> {
    let mut layout = Layout::new();
    for block in blocks {
        match block {
            Block::Title(text) => layout.block(&[text.clone()], &TITLE),
            Block::Label(text) => layout.block(&[text.clone()], &LABEL),
            Block::Paragraph(markup) => layout.block(&markup_lines(markup), &BODY),
            Block::Spacer(height) => layout.advance(*height),
        }
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => FONT_NAME,
        "Flags" => 6,
        "FontBBox" => vec![(-6).into(), (-145).into(), 1003.into(), 880.into()],
        "ItalicAngle" => 0,
        "Ascent" => 880,
        "Descent" => -120,
        "CapHeight" => 880,
        "StemV" => 59,
    });
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Korea1"),
            "Supplement" => 1,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        // Proportional Roman glyphs (CIDs 1-95) are half width.
        "W" => vec![1.into(), 95.into(), 500.into()],
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => format!("{}-{}", FONT_NAME, FONT_ENCODING),
        "Encoding" => FONT_ENCODING,
        "DescendantFonts" => vec![cid_font_id.into()],
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for operations in layout.pages {
        let content = Content { operations };
        let encoded = content.encode().context("Failed to encode PDF page content")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("Failed to serialize PDF")?;
    Ok(bytes)
}
