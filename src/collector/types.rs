//! Keystroke and key-pair types shared by the feed and the identification core.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Character code of a key press, including non-printable control codes.
pub type KeyCode = u32;

/// A single key press: its character code and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keystroke {
    /// Character code of the key
    pub code: KeyCode,
    /// Unix timestamp in fractional seconds
    pub timestamp: f64,
}

impl Keystroke {
    pub fn new(code: KeyCode, timestamp: f64) -> Self {
        Self { code, timestamp }
    }
}

/// Two consecutive key codes. Order matters: `(a, b) != (b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyPair {
    pub previous: KeyCode,
    pub current: KeyCode,
}

impl KeyPair {
    pub fn new(previous: KeyCode, current: KeyCode) -> Self {
        Self { previous, current }
    }

    /// Pair formed by two keystrokes in the order they were typed.
    pub fn between(first: &Keystroke, second: &Keystroke) -> Self {
        Self::new(first.code, second.code)
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{},{}:{})",
            self.previous,
            key_name(self.previous),
            self.current,
            key_name(self.current)
        )
    }
}

/// ASCII names for codes 0..=31.
const CONTROL_NAMES: [&str; 32] = [
    "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "HT", "LF", "VT", "FF", "CR",
    "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM", "SUB", "ESC",
    "FS", "GS", "RS", "US",
];

/// Human-readable name for a key code.
///
/// Control codes get their ASCII mnemonic, space and delete are spelled out,
/// everything else is rendered as the character itself.
pub fn key_name(code: KeyCode) -> Cow<'static, str> {
    match code {
        0..=31 => Cow::Borrowed(CONTROL_NAMES[code as usize]),
        32 => Cow::Borrowed("space"),
        127 => Cow::Borrowed("delete"),
        _ => match char::from_u32(code) {
            Some(c) => Cow::Owned(c.to_string()),
            None => Cow::Borrowed("?"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_order_matters() {
        assert_ne!(KeyPair::new(104, 101), KeyPair::new(101, 104));
        assert_eq!(KeyPair::new(104, 101), KeyPair::new(104, 101));
    }

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(8), "BS");
        assert_eq!(key_name(13), "CR");
        assert_eq!(key_name(32), "space");
        assert_eq!(key_name(127), "delete");
        assert_eq!(key_name(104), "h");
    }

    #[test]
    fn test_key_pair_display() {
        let pair = KeyPair::between(&Keystroke::new(100, 0.0), &Keystroke::new(32, 0.1));
        assert_eq!(pair.to_string(), "(100:d,32:space)");
    }
}
