//! Outbound payload construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Substitute for characters the target encoding cannot represent
const ASCII_REPLACEMENT: u8 = b'?';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8 => write!(f, "UTF-8"),
            Self::Ascii => write!(f, "ASCII"),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(Self::Utf8),
            "ascii" => Ok(Self::Ascii),
            other => Err(format!("unknown encoding: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    #[default]
    None,
    Lf,
    Cr,
    Crlf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::Crlf => "\r\n",
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Lf => write!(f, "\\n"),
            Self::Cr => write!(f, "\\r"),
            Self::Crlf => write!(f, "\\r\\n"),
        }
    }
}

impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "lf" | "\\n" => Ok(Self::Lf),
            "cr" | "\\r" => Ok(Self::Cr),
            "crlf" | "\\r\\n" => Ok(Self::Crlf),
            other => Err(format!("unknown line ending: {}", other)),
        }
    }
}

/// Appends the line ending and encodes. Never fails: characters outside
/// ASCII become `?` under [`Encoding::Ascii`].
pub fn build(text: &str, encoding: Encoding, line_ending: LineEnding) -> Vec<u8> {
    let mut full = String::with_capacity(text.len() + 2);
    full.push_str(text);
    full.push_str(line_ending.as_str());

    match encoding {
        Encoding::Utf8 => full.into_bytes(),
        Encoding::Ascii => full
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { ASCII_REPLACEMENT })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_lf_round_trip() {
        let payload = build("hi", Encoding::Utf8, LineEnding::Lf);
        assert_eq!(String::from_utf8(payload).unwrap(), "hi\n");
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(build("1", Encoding::Utf8, LineEnding::None), b"1");
        assert_eq!(build("1", Encoding::Utf8, LineEnding::Cr), b"1\r");
        assert_eq!(build("1", Encoding::Ascii, LineEnding::Crlf), b"1\r\n");
    }

    #[test]
    fn test_ascii_substitutes_per_character() {
        let payload = build("héllo ✓ 日本", Encoding::Ascii, LineEnding::Lf);
        assert_eq!(payload, b"h?llo ? ??\n");
        assert!(payload.is_ascii());
    }

    #[test]
    fn test_utf8_keeps_multibyte() {
        assert_eq!(build("é", Encoding::Utf8, LineEnding::None), vec![0xc3, 0xa9]);
    }

    #[test]
    fn test_settings_parse() {
        assert_eq!("UTF-8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!("ascii".parse::<Encoding>(), Ok(Encoding::Ascii));
        assert!("latin1".parse::<Encoding>().is_err());
        assert_eq!("CRLF".parse::<LineEnding>(), Ok(LineEnding::Crlf));
        assert_eq!("\\n".parse::<LineEnding>(), Ok(LineEnding::Lf));
        assert!("nl".parse::<LineEnding>().is_err());
    }
}
