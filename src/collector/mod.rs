//! Keystroke input for the identification engine.
//!
//! This module reads keystroke logs from files (reference samples and
//! recorded sessions) and from a live line feed.

pub mod reader;
pub mod stdin;
pub mod types;

// Re-export commonly used types
pub use reader::{parse_keystrokes, parse_line, read_keystrokes, DataFormatError};
pub use stdin::{CollectorError, LineCollector, LineSource};
pub use types::{key_name, KeyCode, KeyPair, Keystroke};
