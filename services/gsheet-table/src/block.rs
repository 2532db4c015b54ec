//! `gsheet` block configuration
//!
//! Two accepted shapes:
//!
//! ```text
//! sheet=https://...;range=A1:B2;headers=1
//! ```
//!
//! ```text
//! sheet: https://...
//! range: A1:B2
//! ```
//!
//! A single line containing `=` is split on `;` or ` | `. Anything else is
//! read line by line as `key: value`. Parts that do not match are ignored.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Parse block text into raw key/value pairs.
pub fn parse_block_config(source: &str) -> BTreeMap<String, String> {
    let trimmed = source.trim();
    let mut out = BTreeMap::new();

    if trimmed.contains('=') && !trimmed.contains('\n') {
        for part in split_inline(trimmed) {
            if let Some((key, value)) = key_value(part.trim(), '=') {
                out.insert(key, value);
            }
        }
        return out;
    }

    for line in trimmed.lines() {
        if let Some((key, value)) = key_value(line.trim_end_matches('\r'), ':') {
            out.insert(key, value);
        }
    }
    out
}

/// Split on `;` and on `|` surrounded by whitespace.
fn split_inline(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for piece in text.split(';') {
        let chars: Vec<(usize, char)> = piece.char_indices().collect();
        let mut start = 0;
        for window in chars.windows(3) {
            let [(before_at, before), (_, '|'), (after_at, after)] = window else {
                continue;
            };
            if before.is_whitespace() && after.is_whitespace() && *before_at >= start {
                parts.push(&piece[start..*before_at]);
                start = after_at + after.len_utf8();
            }
        }
        parts.push(&piece[start..]);
    }
    parts
}

/// Match `^[\w-]+\s*<sep>\s*(.+)$` and unquote the value.
fn key_value(part: &str, separator: char) -> Option<(String, String)> {
    let key_len = part
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(part.len());
    if key_len == 0 {
        return None;
    }
    let (key, rest) = part.split_at(key_len);
    let value = rest.trim_start().strip_prefix(separator)?.trim();
    if value.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value).to_string()))
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Typed block settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockConfig {
    pub sheet: String,
    pub range: Option<String>,
    pub sheet_name: Option<String>,
    pub gid: Option<String>,
    /// Leading rows rendered as header cells
    pub headers: usize,
    /// Body rows to keep; `None` or `0` keeps all
    pub max_rows: Option<usize>,
}

impl BlockConfig {
    pub fn parse(source: &str) -> Result<Self> {
        Self::from_map(&parse_block_config(source))
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let text = |key: &str| map.get(key).filter(|v| !v.is_empty()).cloned();

        let sheet = text("sheet").ok_or(Error::MissingSheet)?;
        let headers = match text("headers") {
            Some(value) => parse_count("headers", value)?,
            None => 1,
        };
        let max_rows = match text("maxRows") {
            Some(value) => Some(parse_count("maxRows", value)?).filter(|n| *n > 0),
            None => None,
        };

        Ok(Self {
            sheet,
            range: text("range"),
            sheet_name: text("sheetName"),
            gid: text("gid"),
            headers,
            max_rows,
        })
    }
}

fn parse_count(key: &'static str, value: String) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidNumber { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        let result = parse_block_config("sheet=https://foo;range=A1:B2;headers=1");
        assert_eq!(result["sheet"], "https://foo");
        assert_eq!(result["range"], "A1:B2");
        assert_eq!(result["headers"], "1");
    }

    #[test]
    fn parses_yaml_like_config() {
        let result = parse_block_config("sheet: https://foo\nrange: A1:B2\nheaders: 1");
        assert_eq!(result["sheet"], "https://foo");
        assert_eq!(result["range"], "A1:B2");
        assert_eq!(result["headers"], "1");
    }

    #[test]
    fn inline_pipe_separator_and_quotes() {
        let result = parse_block_config(r#"sheet = "https://x/y" | sheetName='Q3 Data' | maxRows=5"#);
        assert_eq!(result["sheet"], "https://x/y");
        assert_eq!(result["sheetName"], "Q3 Data");
        assert_eq!(result["maxRows"], "5");
    }

    #[test]
    fn pipe_without_spaces_is_part_of_value() {
        let result = parse_block_config("sheet=a|b;range=A1");
        assert_eq!(result["sheet"], "a|b");
        assert_eq!(result["range"], "A1");
    }

    #[test]
    fn non_matching_parts_are_ignored() {
        let result = parse_block_config("sheet=https://foo;garbage;=novalue;key=");
        assert_eq!(result.len(), 1);

        let result = parse_block_config("# comment\nsheet: https://foo\nnot a pair\r\nrange: A1\r\n");
        assert_eq!(result.len(), 2);
        assert_eq!(result["range"], "A1");
    }

    #[test]
    fn yaml_values_keep_colons() {
        let result = parse_block_config("sheet: https://docs.google.com/x#gid=1\ngid: 7");
        assert_eq!(result["sheet"], "https://docs.google.com/x#gid=1");
        assert_eq!(result["gid"], "7");
    }

    #[test]
    fn typed_config_defaults() {
        let config = BlockConfig::parse("sheet: https://foo").unwrap();
        assert_eq!(config.sheet, "https://foo");
        assert_eq!(config.headers, 1);
        assert_eq!(config.max_rows, None);
        assert_eq!(config.range, None);
    }

    #[test]
    fn typed_config_reads_all_keys() {
        let config =
            BlockConfig::parse("sheet=https://foo;range=A1:C9;sheetName=Raw;gid=4;headers=2;maxRows=10")
                .unwrap();
        assert_eq!(config.range.as_deref(), Some("A1:C9"));
        assert_eq!(config.sheet_name.as_deref(), Some("Raw"));
        assert_eq!(config.gid.as_deref(), Some("4"));
        assert_eq!(config.headers, 2);
        assert_eq!(config.max_rows, Some(10));
    }

    #[test]
    fn zero_max_rows_means_no_limit() {
        let config = BlockConfig::parse("sheet=https://foo;maxRows=0").unwrap();
        assert_eq!(config.max_rows, None);
    }

    #[test]
    fn missing_sheet_is_reported() {
        let err = BlockConfig::parse("range: A1:B2").unwrap_err();
        assert_eq!(err.to_string(), "Missing `sheet` URL in gsheet block.");
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = BlockConfig::parse("sheet=https://foo;headers=two").unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { key: "headers", .. }));
    }
}
