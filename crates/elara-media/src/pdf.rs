//! Plain-text to PDF export.
//!
//! Output uses a single standard font (Courier, WinAnsi encoding) so no font
//! files need to be embedded. Markdown-style markers are stripped rather than
//! rendered, and characters the encoding cannot represent become `?`.

use elara_common::{Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// File name offered to clients downloading an export.
pub const EXPORT_FILENAME: &str = "elara-response.pdf";

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 11;
const LINE_HEIGHT: i64 = 15;

// Courier advances 600/1000 em per glyph.
const CHARS_PER_LINE: usize = ((PAGE_WIDTH - 2 * MARGIN) * 1000 / (FONT_SIZE * 600)) as usize;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT) as usize;

const SUBSTITUTE: char = '?';

/// Render `text` as a paginated PDF document.
pub fn render(text: &str) -> Result<Vec<u8>> {
    let cleaned = sanitize(&strip_markup(text));
    let lines = wrap(&cleaned, CHARS_PER_LINE);
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![lines.as_slice()]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page_lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LINE_HEIGHT.into()]),
            Operation::new(
                "Td",
                vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN - FONT_SIZE).into()],
            ),
        ];
        for line in page_lines {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(encode_winansi(line))],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations }
            .encode()
            .map_err(|e| Error::Media(format!("failed to encode page content: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| Error::Media(format!("failed to write PDF: {e}")))?;

    debug!(
        "rendered PDF: {} lines over {} page(s), {} bytes",
        lines.len(),
        page_count,
        buffer.len()
    );
    Ok(buffer)
}

/// Remove lightweight markdown markers: headings, emphasis, code ticks and fences, quotes.
pub fn strip_markup(text: &str) -> String {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }

        let mut line = trimmed;
        if line.starts_with('#') {
            line = line.trim_start_matches('#').trim_start();
        }
        if let Some(rest) = line.strip_prefix('>') {
            line = rest.trim_start();
        }

        // Keep list bullets readable once the asterisks are gone.
        let (bullet, body) = match line.strip_prefix("* ") {
            Some(rest) => ("- ", rest),
            None => ("", line),
        };

        out.push(format!("{bullet}{}", strip_inline(body)));
    }
    out.join("\n")
}

/// Remove paired emphasis and inline-code delimiters, leaving stray `*`, `_`
/// and identifiers such as `__init__` untouched.
fn strip_inline(line: &str) -> String {
    static CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("code regex should compile"));
    static STRONG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(^|[^\w*])\*\*([^\s*](?:[^*]*?[^\s*])?)\*\*($|[^\w*])")
            .expect("strong regex should compile")
    });
    static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(^|[^\w*])\*([^\s*](?:[^*]*?[^\s*])?)\*($|[^\w*])")
            .expect("emphasis regex should compile")
    });
    static UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(^|[^\w])__([^\s_](?:.*?[^\s_])?)__($|[^\w])")
            .expect("underscore regex should compile")
    });

    let line = CODE.replace_all(line, "${1}");
    let line = STRONG.replace_all(&line, "${1}${2}${3}");
    let line = EMPHASIS.replace_all(&line, "${1}${2}${3}");
    UNDERSCORE
        .replace_all(&line, |caps: &Captures<'_>| {
            let inner = &caps[2];
            // A bare word between dunders is an identifier, not emphasis.
            if inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
                caps[0].to_string()
            } else {
                format!("{}{}{}", &caps[1], inner, &caps[3])
            }
        })
        .into_owned()
}

/// Replace every character WinAnsi cannot show with `?`; tabs become spaces.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' => '\n',
            '\t' => ' ',
            c if winansi_byte(c).is_some() => c,
            _ => SUBSTITUTE,
        })
        .collect()
}

fn winansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '€' => 0x80,
        '‚' => 0x82,
        '„' => 0x84,
        '…' => 0x85,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '™' => 0x99,
        c if (' '..='~').contains(&c) => c as u8,
        c if ('\u{A0}'..='\u{FF}').contains(&c) => c as u32 as u8,
        _ => return None,
    };
    Some(byte)
}

fn encode_winansi(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| winansi_byte(c).unwrap_or(SUBSTITUTE as u8))
        .collect()
}

/// Greedy word wrap on character count. Words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        lines.push(current);
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
