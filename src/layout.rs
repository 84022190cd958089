//! Rendering of [`LogRecord`]s into the lines that are queued and shipped.
//!
//! A layout is a template with `{placeholder}` tokens, parsed once and
//! rendered per event. `{{` and `}}` produce literal braces.
//!
//! | token | output |
//! |---|---|
//! | `{timestamp}` | UTC time, `2024-05-01 12:00:00.123` |
//! | `{level}` | `ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE` |
//! | `{target}` | event target |
//! | `{message}` | event message, empty if absent |
//! | `{fields}` | ` key=value` for every structured field |
//! | `{json}` | the whole record as one JSON object |
//! | `{file}` / `{line}` | source location, empty if unknown |
//! | `{newline}` | `\n` |
//!
//! Every rendered line ends with exactly one trailing newline, whether or
//! not the template asks for it.

use crate::error::ConfigError;
use crate::record::LogRecord;
use std::fmt::Write as _;

pub const DEFAULT_LAYOUT: &str = "{timestamp}|{level}|{target}|{message}{fields}{newline}";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Timestamp,
    Level,
    Target,
    Message,
    Fields,
    Json,
    File,
    Line,
    Newline,
}

/// Parsed layout template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    segments: Vec<Segment>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Timestamp,
                Segment::Literal("|".to_string()),
                Segment::Level,
                Segment::Literal("|".to_string()),
                Segment::Target,
                Segment::Literal("|".to_string()),
                Segment::Message,
                Segment::Fields,
                Segment::Newline,
            ],
        }
    }
}

impl Layout {
    /// Parse `template`.
    ///
    /// **Returns**
    /// - `Err(ConfigError::InvalidLayout)` for an unknown placeholder or an
    ///   unbalanced brace.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidLayout {
            template: template.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(invalid("unterminated placeholder".to_string())),
                        }
                    }
                    let segment = match name.as_str() {
                        "timestamp" => Segment::Timestamp,
                        "level" => Segment::Level,
                        "target" => Segment::Target,
                        "message" => Segment::Message,
                        "fields" => Segment::Fields,
                        "json" => Segment::Json,
                        "file" => Segment::File,
                        "line" => Segment::Line,
                        "newline" => Segment::Newline,
                        other => return Err(invalid(format!("unknown placeholder {{{other}}}"))),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => return Err(invalid("unmatched '}'".to_string())),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Render `record` into one newline-terminated line.
    pub fn render(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Timestamp => {
                    let _ = write!(out, "{}", record.timestamp.format(TIMESTAMP_FORMAT));
                }
                Segment::Level => out.push_str(&record.level),
                Segment::Target => out.push_str(&record.target),
                Segment::Message => out.push_str(record.message.as_deref().unwrap_or_default()),
                Segment::Fields => {
                    for (key, value) in &record.fields {
                        match value {
                            serde_json::Value::String(s) => {
                                let _ = write!(out, " {key}={s}");
                            }
                            other => {
                                let _ = write!(out, " {key}={other}");
                            }
                        }
                    }
                }
                Segment::Json => {
                    if let Ok(json) = serde_json::to_string(record) {
                        out.push_str(&json);
                    }
                }
                Segment::File => out.push_str(record.file.as_deref().unwrap_or_default()),
                Segment::Line => {
                    if let Some(line) = record.line {
                        let _ = write!(out, "{line}");
                    }
                }
                Segment::Newline => out.push('\n'),
            }
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn record() -> LogRecord {
        let mut fields = BTreeMap::new();
        fields.insert("order_id".to_string(), serde_json::Value::from(42u64));
        fields.insert("user".to_string(), serde_json::Value::from("ann"));
        LogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap(),
            level: "INFO".to_string(),
            target: "shop::orders".to_string(),
            module_path: Some("shop::orders".to_string()),
            file: Some("src/orders.rs".to_string()),
            line: Some(17),
            fields,
            message: Some("order placed".to_string()),
        }
    }

    #[test]
    fn default_layout_matches_default_template() {
        assert_eq!(Layout::parse(DEFAULT_LAYOUT).unwrap(), Layout::default());
    }

    #[test]
    fn default_layout_renders_pipe_separated_line() {
        let line = Layout::default().render(&record());
        assert_eq!(
            line,
            "2024-05-01 12:30:05.000|INFO|shop::orders|order placed order_id=42 user=ann\n"
        );
    }

    #[test]
    fn missing_newline_is_appended_once() {
        let layout = Layout::parse("{level}: {message}").unwrap();
        assert_eq!(layout.render(&record()), "INFO: order placed\n");

        let layout = Layout::parse("{level}: {message}{newline}").unwrap();
        assert_eq!(layout.render(&record()), "INFO: order placed\n");
    }

    #[test]
    fn escaped_braces_and_location() {
        let layout = Layout::parse("{{{level}}} {file}:{line}").unwrap();
        assert_eq!(layout.render(&record()), "{INFO} src/orders.rs:17\n");
    }

    #[test]
    fn json_token_serializes_record() {
        let line = Layout::parse("{json}").unwrap().render(&record());
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["message"], "order placed");
        assert_eq!(value["fields"]["order_id"], 42);
    }

    #[test]
    fn bad_templates_are_rejected() {
        for template in ["{nope}", "{level", "level}"] {
            assert!(
                matches!(Layout::parse(template), Err(ConfigError::InvalidLayout { .. })),
                "{template} should be rejected"
            );
        }
    }
}
