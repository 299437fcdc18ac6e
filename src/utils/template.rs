//! Mail-merge for `.docx` templates.
//!
//! A `.docx` file is a zip archive of XML parts. Merge tags are written as
//! `{field}` in the document text; Word is free to split such a tag across
//! several runs, so the scanner only looks at character data and carries the
//! markup it crosses over to the far side of the substituted value.

use std::io::{Cursor, Read, Write};

use derive_more::Display;
use serde_json::{Map, Value};
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::FileOptions};

#[derive(Debug, Display)]
pub enum TemplateError {
    #[display(fmt = "Template archive error: {}", _0)]
    Archive(String),
    #[display(fmt = "No value provided for merge tag '{}'", _0)]
    MissingValue(String),
    #[display(fmt = "Malformed merge tag in {}", _0)]
    MalformedTag(String),
}

impl From<ZipError> for TemplateError {
    fn from(e: ZipError) -> Self {
        TemplateError::Archive(e.to_string())
    }
}

impl From<std::io::Error> for TemplateError {
    fn from(e: std::io::Error) -> Self {
        TemplateError::Archive(e.to_string())
    }
}

const DOCUMENT_PART: &str = "word/document.xml";

fn is_merge_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Text for a scalar JSON value; `null` renders empty.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn valid_tag_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Default)]
struct PendingTag {
    name: String,
    markup: String,
}

/// Replaces every `{field}` in the character data of one XML part.
fn merge_xml(xml: &str, part: &str, values: &Map<String, Value>) -> Result<String, TemplateError> {
    let malformed = || TemplateError::MalformedTag(part.to_string());

    let mut out = String::with_capacity(xml.len());
    let mut pending: Option<PendingTag> = None;
    let mut markup_start: Option<usize> = None;

    for (idx, ch) in xml.char_indices() {
        if let Some(start) = markup_start {
            if ch == '>' {
                markup_start = None;
                let element = &xml[start..=idx];
                match pending.as_mut() {
                    // a tag never crosses a paragraph boundary
                    Some(_) if element == "</w:p>" => return Err(malformed()),
                    Some(tag) => tag.markup.push_str(element),
                    None => out.push_str(element),
                }
            }
            continue;
        }

        match ch {
            '<' => markup_start = Some(idx),
            '{' if pending.is_some() => return Err(malformed()),
            '{' => pending = Some(PendingTag::default()),
            '}' => match pending.take() {
                Some(tag) => {
                    let name = tag.name.trim();
                    if !valid_tag_name(name) {
                        return Err(malformed());
                    }
                    let value = values
                        .get(name)
                        .and_then(scalar_text)
                        .ok_or_else(|| TemplateError::MissingValue(name.to_string()))?;
                    out.push_str(&escape_xml(&value));
                    out.push_str(&tag.markup);
                }
                None => out.push('}'),
            },
            _ => match pending.as_mut() {
                Some(tag) => tag.name.push(ch),
                None => out.push(ch),
            },
        }
    }

    if markup_start.is_some() || pending.is_some() {
        return Err(malformed());
    }
    Ok(out)
}

/// Renders a `.docx` template: merges the body, header and footer parts and
/// copies every other entry through untouched.
pub fn render_docx(template: &[u8], values: &Map<String, Value>) -> Result<Vec<u8>, TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut has_document = false;

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();

        if is_merge_part(&name) {
            let mut xml = String::new();
            archive.by_index(i)?.read_to_string(&mut xml)?;
            let merged = merge_xml(&xml, &name, values)?;

            has_document |= name == DOCUMENT_PART;
            writer.start_file(name, options)?;
            writer.write_all(merged.as_bytes())?;
        } else {
            writer.raw_copy_file(archive.by_index_raw(i)?)?;
        }
    }

    if !has_document {
        return Err(TemplateError::Archive(format!("{DOCUMENT_PART} is missing")));
    }

    Ok(writer.finish()?.into_inner())
}
