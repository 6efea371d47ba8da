//! Reader for keystroke log files.
//!
//! Each line holds an integer key code and a fractional Unix timestamp,
//! separated by whitespace. There is no header row; blank lines are skipped.

use crate::collector::types::{KeyCode, Keystroke};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A keystroke file is missing or cannot be parsed.
#[derive(Debug, Error)]
pub enum DataFormatError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Read all keystrokes from a file, in file order.
pub fn read_keystrokes(path: &Path) -> Result<Vec<Keystroke>, DataFormatError> {
    let content = std::fs::read_to_string(path).map_err(|source| DataFormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_keystrokes(&content).map_err(|(line, reason)| DataFormatError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Parse keystroke records from text. Errors carry the 1-based line number.
pub fn parse_keystrokes(content: &str) -> Result<Vec<Keystroke>, (usize, String)> {
    let mut keystrokes = Vec::new();

    for (index, line) in content.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(keystroke)) => keystrokes.push(keystroke),
            Ok(None) => {}
            Err(reason) => return Err((index + 1, reason)),
        }
    }

    Ok(keystrokes)
}

/// Parse a single record. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Keystroke>, String> {
    let mut fields = line.split_whitespace();

    let (code, timestamp) = match (fields.next(), fields.next(), fields.next()) {
        (None, _, _) => return Ok(None),
        (Some(code), Some(timestamp), None) => (code, timestamp),
        _ => return Err("expected exactly two fields".to_string()),
    };

    Ok(Some(Keystroke::new(
        parse_code(code)?,
        parse_timestamp(timestamp)?,
    )))
}

fn parse_code(field: &str) -> Result<KeyCode, String> {
    if let Ok(code) = field.parse::<KeyCode>() {
        return Ok(code);
    }

    // Logs written through a float formatter store codes as e.g. "104.0"
    match field.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= KeyCode::MAX as f64 => {
            Ok(value as KeyCode)
        }
        _ => Err(format!("invalid key code {field:?}")),
    }
}

fn parse_timestamp(field: &str) -> Result<f64, String> {
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("invalid timestamp {field:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let content = "104 1400000000.10\n101 1400000000.21\n\n32 1400000000.35\n";
        let keystrokes = parse_keystrokes(content).unwrap();

        assert_eq!(keystrokes.len(), 3);
        assert_eq!(keystrokes[0].code, 104);
        assert_eq!(keystrokes[2].code, 32);
        assert!((keystrokes[1].timestamp - 1400000000.21).abs() < 1e-6);
    }

    #[test]
    fn test_float_key_code() {
        let keystroke = parse_line("104.0 12.5").unwrap().unwrap();
        assert_eq!(keystroke.code, 104);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_line("104").is_err());
        assert!(parse_line("104 1.0 2.0").is_err());
        assert!(parse_line("h 1.0").is_err());
        assert!(parse_line("-3 1.0").is_err());
        assert!(parse_line("104 nan").is_err());

        let err = parse_keystrokes("104 1.0\nbad line here\n").unwrap_err();
        assert_eq!(err.0, 2);
    }

    #[test]
    fn test_missing_file() {
        let err = read_keystrokes(Path::new("/nonexistent/typist-id/ref.txt")).unwrap_err();
        assert!(matches!(err, DataFormatError::Io { .. }));
    }
}
