//! Parser for the Harmonic-HN bookmark export format.
//!
//! The export is a single dash-delimited string of `{itemId}q{timestampMs}`
//! entries, e.g. `38926554q1704495600000-38930203q1704499200000`.

use thiserror::Error;

/// One bookmark from a Harmonic export: a Hacker News item id and the unix
/// timestamp (seconds) at which it was bookmarked. The export stores
/// milliseconds; [`parse`] converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmonicBookmark {
    pub id: u64,
    pub timestamp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    EmptyInput,
    #[error("no valid bookmarks found")]
    NoBookmarks,
    #[error("invalid bookmark at index {index}: {reason}")]
    InvalidBookmark { index: usize, reason: String },
}

/// Parses a single `{itemId}q{timestampMs}` entry.
fn parse_bookmark(entry: &str) -> Result<HarmonicBookmark, String> {
    let (id_str, ts_str) = entry
        .split_once('q')
        .ok_or_else(|| "missing 'q' separator".to_string())?;
    if id_str.is_empty() {
        return Err("missing item id".to_string());
    }
    if ts_str.is_empty() {
        return Err("missing timestamp".to_string());
    }

    let id: u64 = id_str
        .parse()
        .map_err(|e| format!("invalid item id: {e}"))?;
    if id == 0 {
        return Err("item id must be positive".to_string());
    }
    let timestamp_ms: i64 = ts_str
        .parse()
        .map_err(|e| format!("invalid timestamp: {e}"))?;
    if timestamp_ms <= 0 {
        return Err("timestamp must be positive".to_string());
    }

    Ok(HarmonicBookmark {
        id,
        timestamp: timestamp_ms / 1000,
    })
}

/// Parses a full Harmonic export string.
///
/// Whitespace and stray leading/trailing dashes are tolerated; empty
/// segments are skipped. Any malformed entry fails the whole parse with its
/// index so the user can find it in the export.
pub fn parse(input: &str) -> Result<Vec<HarmonicBookmark>, ParseError> {
    let input = input.trim().trim_matches('-');
    if input.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut bookmarks = Vec::new();
    for (index, part) in input.split('-').enumerate() {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let bookmark = parse_bookmark(part)
            .map_err(|reason| ParseError::InvalidBookmark { index, reason })?;
        bookmarks.push(bookmark);
    }

    if bookmarks.is_empty() {
        return Err(ParseError::NoBookmarks);
    }
    Ok(bookmarks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_entry() {
        let parsed = parse("38926554q1704495600000").unwrap();
        assert_eq!(
            parsed,
            vec![HarmonicBookmark {
                id: 38926554,
                timestamp: 1704495600,
            }]
        );
    }

    #[test]
    fn parses_multiple_entries_and_converts_milliseconds() {
        let parsed = parse("1q1000-2q2000-3q3500").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], HarmonicBookmark { id: 1, timestamp: 1 });
        assert_eq!(parsed[1], HarmonicBookmark { id: 2, timestamp: 2 });
        assert_eq!(parsed[2], HarmonicBookmark { id: 3, timestamp: 3 });
    }

    #[test]
    fn tolerates_whitespace_and_stray_dashes() {
        let parsed = parse("  -1q1000-2q2000-  ").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn skips_empty_segments() {
        let parsed = parse("1q1000--2q2000").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyInput);
        assert_eq!(parse("   ").unwrap_err(), ParseError::EmptyInput);
        assert_eq!(parse("---").unwrap_err(), ParseError::EmptyInput);
    }

    #[test]
    fn rejects_missing_separator() {
        let err = parse("12345").unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidBookmark { index: 0, ref reason } if reason.contains("separator")
        ));
    }

    #[test]
    fn rejects_missing_id_or_timestamp() {
        assert!(matches!(
            parse("q1000").unwrap_err(),
            ParseError::InvalidBookmark { ref reason, .. } if reason.contains("missing item id")
        ));
        assert!(matches!(
            parse("1q").unwrap_err(),
            ParseError::InvalidBookmark { ref reason, .. } if reason.contains("missing timestamp")
        ));
    }

    #[test]
    fn rejects_non_numeric_and_non_positive_values() {
        assert!(parse("abcq1000").is_err());
        assert!(parse("1qabc").is_err());
        assert!(parse("0q1000").is_err());
        assert!(parse("1q0").is_err());
        assert!(parse("1q-5").is_err());
    }

    #[test]
    fn reports_the_failing_index() {
        let err = parse("1q1000-2q2000-badentry").unwrap_err();
        assert!(matches!(err, ParseError::InvalidBookmark { index: 2, .. }));
    }
}
