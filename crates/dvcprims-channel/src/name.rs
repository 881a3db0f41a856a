use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ChannelError, Result};

/// Longest permitted channel name, in characters.
pub const MAX_CHANNEL_NAME_LEN: usize = 7;

/// Check that `name` can identify a virtual channel.
///
/// A name must be non-empty, not only whitespace, at most
/// [`MAX_CHANNEL_NAME_LEN`] characters, and ASCII throughout.
pub fn validate_channel_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("empty or whitespace")
    } else if !name.is_ascii() {
        Some("contains non-ASCII characters")
    } else if name.len() > MAX_CHANNEL_NAME_LEN {
        Some("longer than 7 characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ChannelError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: &str) -> Result<Self> {
        validate_channel_name(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the socket that serves this channel.
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-escaped so every valid name
    /// maps to a distinct, path-safe file.
    pub fn socket_file_name(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 3 + 5);
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
        out.push_str(".sock");
        out
    }

    /// Socket path for this channel inside `dir`.
    pub fn socket_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(self.socket_file_name())
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelName {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_ascii_names() {
        assert!(validate_channel_name("AB").is_ok());
        assert!(validate_channel_name("ABCDEFG").is_ok());
        assert!(validate_channel_name("a b").is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        for name in ["", " ", "\t\n"] {
            let err = validate_channel_name(name).unwrap_err();
            assert!(matches!(err, ChannelError::InvalidName { .. }), "{name:?}");
        }
    }

    #[test]
    fn rejects_eight_characters() {
        let err = validate_channel_name("ABCDEFGH").unwrap_err();
        assert!(matches!(
            err,
            ChannelError::InvalidName {
                reason: "longer than 7 characters",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_ascii() {
        assert!(validate_channel_name("é").is_err());
        assert!(validate_channel_name("AB\u{80}").is_err());
        assert!(validate_channel_name("日本").is_err());
    }

    #[test]
    fn newtype_validates() {
        let name: ChannelName = "ECHO".parse().unwrap();
        assert_eq!(name.as_str(), "ECHO");
        assert_eq!(name.to_string(), "ECHO");
        assert!(ChannelName::try_from("TOOLONGX").is_err());
    }

    #[test]
    fn socket_file_names_are_escaped() {
        let name = ChannelName::new("a/b.c").unwrap();
        assert_eq!(name.socket_file_name(), "a%2Fb%2Ec.sock");

        let name = ChannelName::new("Echo_1").unwrap();
        assert_eq!(
            name.socket_path("/tmp/dvc"),
            PathBuf::from("/tmp/dvc/Echo_1.sock")
        );
    }
}
