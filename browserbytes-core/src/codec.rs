/*!
Transport encodings for snapshots.

Exports are written either as pretty-printed JSON or as the Base64
"text-safe" form of that JSON, which survives copy/paste channels that
mangle raw JSON. Payloads read back from a file or a cloud record are either
a plain [`Snapshot`] or an encrypted [`Envelope`]; [`Payload::parse`] tells
them apart by the `encrypted` flag.
*/

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine as _,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{envelope::Envelope, BrowserBytesError, Result, Snapshot};

/// Maximum length of the title component in export file names
pub const MAX_TITLE_LEN: usize = 50;

// Pasted text often loses its trailing `=`; accept it either way.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Base64-encode a string so it can travel through text-only channels
pub fn to_text_safe(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Reverse [`to_text_safe`].
///
/// Whitespace (line wrapping from pasted text) is ignored and the trailing
/// `=` padding is optional.
///
/// # Errors
/// * `BrowserBytesError::Format` - invalid Base64, or bytes that are not UTF-8
pub fn from_text_safe(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT
        .decode(compact.as_bytes())
        .map_err(|e| BrowserBytesError::format(format!("Invalid Base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| BrowserBytesError::format(format!("Invalid UTF-8 in decoded text: {e}")))
}

/// On-disk representation of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Base64 of the pretty-printed JSON
    Base64,
}

impl ExportFormat {
    /// Label used in export file names
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Base64 => "base64",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Base64 => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Base64 => "text/plain",
        }
    }

    /// Apply the format's text transform to already-serialized JSON
    pub fn encode_text(&self, json: &str) -> String {
        match self {
            ExportFormat::Json => json.to_string(),
            ExportFormat::Base64 => to_text_safe(json),
        }
    }

    /// Undo [`ExportFormat::encode_text`]
    pub fn decode_text(&self, text: &str) -> Result<String> {
        match self {
            ExportFormat::Json => Ok(text.to_string()),
            ExportFormat::Base64 => from_text_safe(text),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = BrowserBytesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "base64" | "text" | "txt" => Ok(ExportFormat::Base64),
            other => Err(BrowserBytesError::validation(format!(
                "Unknown export format '{other}' (expected json or base64)"
            ))),
        }
    }
}

/// Encode a snapshot or envelope as the contents of an export file
pub fn encode_export(payload: &Payload, format: ExportFormat) -> Result<String> {
    Ok(format.encode_text(&payload.to_json_pretty()?))
}

/// Decode the contents of an export file.
///
/// # Errors
/// * `BrowserBytesError::Format` - bad Base64, bad JSON or a malformed snapshot
pub fn decode_import(text: &str, format: ExportFormat) -> Result<Payload> {
    Payload::parse(&format.decode_text(text)?)
}

/// A serialized payload read back from a file or a cloud record
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Plain(Snapshot),
    Sealed(Envelope),
}

impl Payload {
    /// Parse JSON text into a plain snapshot or an encrypted envelope.
    ///
    /// An object whose `encrypted` field is `true` is read as an envelope;
    /// anything else must be a snapshot.
    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Same as [`Payload::parse`] for an already-parsed JSON value.
    ///
    /// Cloud records may carry their data as a JSON string or as an embedded
    /// object; a string is parsed once more.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(inner) => Self::parse(&inner),
            value if Envelope::is_envelope(&value) => {
                Ok(Payload::Sealed(serde_json::from_value(value)?))
            }
            value => Ok(Payload::Plain(serde_json::from_value(value)?)),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Payload::Sealed(_))
    }

    /// Compact JSON for storing in a cloud record
    pub fn to_json(&self) -> Result<String> {
        match self {
            Payload::Plain(snapshot) => snapshot.to_json(),
            Payload::Sealed(envelope) => Ok(serde_json::to_string(envelope)?),
        }
    }

    /// Pretty-printed JSON for export files
    pub fn to_json_pretty(&self) -> Result<String> {
        match self {
            Payload::Plain(snapshot) => snapshot.to_json_pretty(),
            Payload::Sealed(envelope) => Ok(serde_json::to_string_pretty(envelope)?),
        }
    }
}

/// Replace characters that are not allowed in file names and clip the length
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_TITLE_LEN)
        .collect()
}

/// Build the export file name `<prefix>_<title-or-timestamp>_<format>.<ext>`
///
/// # Arguments
/// * `prefix` - File name prefix, e.g. `browserbytes`
/// * `title` - Tab title; blank titles fall back to the timestamp
/// * `format` - Export format, selecting the label and the extension
/// * `now` - Timestamp used when the title is blank
pub fn export_filename(
    prefix: &str,
    title: &str,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> String {
    let stem = sanitize_title(title.trim());
    let stem = if stem.is_empty() {
        now.format("%Y%m%d-%H%M%S").to_string()
    } else {
        stem
    };
    format!(
        "{prefix}_{stem}_{}.{}",
        format.label(),
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cookie;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn snapshot() -> Snapshot {
        let mut storage = BTreeMap::new();
        storage.insert("theme".to_string(), "dark".to_string());
        Snapshot::new(storage, vec![Cookie::new("sid", "x", "example.com")])
    }

    #[test]
    fn test_text_safe_roundtrip() {
        for text in ["", "plain", "{\"a\": [1, 2]}", "ümlaut ✓ 日本語", "line\nbreak\t"] {
            assert_eq!(from_text_safe(&to_text_safe(text)).unwrap(), text);
        }
    }

    #[test]
    fn test_text_safe_tolerates_wrapped_input() {
        let encoded = to_text_safe("a fairly long piece of text that wraps when pasted");
        let wrapped = format!("  {}\n{}\r\n", &encoded[..20], &encoded[20..]);
        assert_eq!(
            from_text_safe(&wrapped).unwrap(),
            "a fairly long piece of text that wraps when pasted"
        );
    }

    #[test]
    fn test_text_safe_rejects_garbage() {
        assert!(matches!(
            from_text_safe("not*base64!"),
            Err(BrowserBytesError::Format(_))
        ));
        // valid Base64, invalid UTF-8
        assert!(matches!(
            from_text_safe(&STANDARD.encode([0xff, 0xfe])),
            Err(BrowserBytesError::Format(_))
        ));
    }

    #[test]
    fn test_text_safe_accepts_missing_padding() {
        // {"a":1} without its trailing padding
        assert_eq!(from_text_safe("eyJhIjoxfQ").unwrap(), r#"{"a":1}"#);
        assert_eq!(from_text_safe("eyJhIjoxfQ==").unwrap(), r#"{"a":1}"#);
        assert_eq!(from_text_safe(&to_text_safe("ab")).unwrap(), "ab");
    }

    #[test]
    fn test_export_import_both_formats() {
        let original = Payload::Plain(snapshot());
        for format in [ExportFormat::Json, ExportFormat::Base64] {
            let text = encode_export(&original, format).unwrap();
            assert_eq!(decode_import(&text, format).unwrap(), original);
        }
    }

    #[test]
    fn test_sealed_export_keeps_envelope() {
        let envelope = Envelope::seal(&snapshot().to_json().unwrap(), "k").unwrap();
        let sealed = Payload::Sealed(envelope.clone());
        let text = encode_export(&sealed, ExportFormat::Base64).unwrap();

        match decode_import(&text, ExportFormat::Base64).unwrap() {
            Payload::Sealed(decoded) => assert_eq!(decoded, envelope),
            other => panic!("expected an envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_base64_export_decodes_to_pretty_json() {
        let text = encode_export(&Payload::Plain(snapshot()), ExportFormat::Base64).unwrap();
        let json = from_text_safe(&text).unwrap();
        assert!(json.starts_with("{\n"));
    }

    #[test]
    fn test_payload_detects_plain_snapshot() {
        let json = snapshot().to_json().unwrap();
        match Payload::parse(&json).unwrap() {
            Payload::Plain(parsed) => assert_eq!(parsed, snapshot()),
            Payload::Sealed(_) => panic!("expected a plain snapshot"),
        }
    }

    #[test]
    fn test_payload_accepts_string_wrapped_json() {
        let inner = snapshot().to_json().unwrap();
        let wrapped = serde_json::Value::String(inner);
        let payload = Payload::from_value(wrapped).unwrap();
        assert!(!payload.is_encrypted());
    }

    #[test]
    fn test_payload_detects_envelope() {
        let json = r#"{"encrypted": true, "salt": "AAAAAAAAAAAAAAAAAAAAAA==",
                       "iv": "AAAAAAAAAAAAAAAA", "data": "AAAA"}"#;
        assert!(Payload::parse(json).unwrap().is_encrypted());
    }

    #[test]
    fn test_payload_with_false_flag_is_not_an_envelope() {
        let json = r#"{"encrypted": false, "localStorage": {}, "cookies": {}}"#;
        assert!(!Payload::parse(json).unwrap().is_encrypted());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("base64".parse::<ExportFormat>().unwrap(), ExportFormat::Base64);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_filename() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        assert_eq!(
            export_filename("browserbytes", "Inbox: a/b <c>?", ExportFormat::Json, now),
            "browserbytes_Inbox_ a_b _c__json.json"
        );
        assert_eq!(
            export_filename("browserbytes", "   ", ExportFormat::Base64, now),
            "browserbytes_20240309-140507_base64.txt"
        );

        let long_title = "x".repeat(80);
        let name = export_filename("bb", &long_title, ExportFormat::Json, now);
        assert_eq!(name, format!("bb_{}_json.json", "x".repeat(MAX_TITLE_LEN)));
    }
}
