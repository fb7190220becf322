//! Best-effort identity extraction from resume documents.
//!
//! Text is pulled out of DOCX (`word/document.xml` inside the zip container)
//! or PDF (page text decoded by lopdf, compressed streams included), then
//! scanned for a name, an email and a phone number.
//! Any failure is a [`Collaborator::Extraction`] outage; the caller still
//! creates the candidate and collects the fields conversationally.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Collaborator, SessionError};
use crate::session::{IdentityField, IdentityFields};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("invalid email pattern")
});

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\+\d{1,3}[- ]?)?\d{10,12}").expect("invalid phone pattern"));

static XML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("invalid tag pattern"));

static XML_CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:x([0-9A-Fa-f]+)|([0-9]+));").expect("invalid character reference pattern")
});

const MAX_NAME_CHARS: usize = 60;

/// Declared resume document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Infers the kind from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }
}

/// Extracts best-effort identity fields from a resume document.
pub fn extract_identity(bytes: &[u8], kind: DocumentKind) -> Result<IdentityFields, SessionError> {
    let text = extract_text(bytes, kind)?;
    Ok(parse_identity_fields(&text))
}

pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, SessionError> {
    let text = match kind {
        DocumentKind::Docx => docx_text(bytes)?,
        DocumentKind::Pdf => pdf_text(bytes)?,
    };
    if text.trim().is_empty() {
        return Err(SessionError::unavailable(
            Collaborator::Extraction,
            "no text found in document",
        ));
    }
    Ok(text)
}

fn docx_text(bytes: &[u8]) -> Result<String, SessionError> {
    let unavailable = |e: zip::result::ZipError| {
        SessionError::unavailable(Collaborator::Extraction, format!("unreadable docx: {e}"))
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(unavailable)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(unavailable)?
        .read_to_string(&mut xml)?;

    let with_breaks = xml.replace("</w:p>", "\n").replace("<w:tab/>", " ");
    Ok(unescape_xml(&XML_TAG.replace_all(&with_breaks, "")))
}

/// Decodes numeric character references, then the five predefined entities.
/// References that name no valid character are dropped.
fn unescape_xml(text: &str) -> String {
    let decoded = XML_CHAR_REF.replace_all(text, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    decoded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn pdf_text(bytes: &[u8]) -> Result<String, SessionError> {
    let unavailable = |e: lopdf::Error| {
        SessionError::unavailable(Collaborator::Extraction, format!("unreadable pdf: {e}"))
    };
    let document = lopdf::Document::load_mem(bytes).map_err(unavailable)?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    document.extract_text(&pages).map_err(unavailable)
}

/// Scans free text for the first email, the first phone number, and a name
/// guess: the first line with no digits that does not contain the email.
pub fn parse_identity_fields(text: &str) -> IdentityFields {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let joined = lines.join(" ");
    let email = EMAIL.find(&joined).map(|m| m.as_str().to_string());
    let phone = PHONE.find(&joined).map(|m| m.as_str().to_string());

    let name = lines
        .iter()
        .find(|l| {
            !l.chars().any(|c| c.is_ascii_digit())
                && email.as_deref().is_none_or(|e| !l.contains(e))
                && l.chars().count() <= MAX_NAME_CHARS
        })
        .and_then(|l| l.split('|').next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    IdentityFields { name, email, phone }
}

/// Validates a conversationally supplied field and returns the trimmed value.
pub fn validate_field(field: IdentityField, value: &str) -> Result<String, SessionError> {
    let trimmed = value.trim();
    let valid = match field {
        IdentityField::Name => !trimmed.is_empty(),
        IdentityField::Email => EMAIL.is_match(trimmed),
        IdentityField::Phone => PHONE.is_match(trimmed),
    };
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(SessionError::InvalidField {
            field,
            value: trimmed.to_string(),
        })
    }
}
