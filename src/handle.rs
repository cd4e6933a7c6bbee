//! Blog handle validation.
//!
//! A handle is the subdomain part of a blog address (`example` in
//! `example.tumblr.com`). Validation is pure and runs before any request is
//! made, so an invalid handle never reaches the network.

use std::fmt;
use std::str::FromStr;

/// Maximum handle length in characters.
pub const MAX_HANDLE_LENGTH: usize = 32;

/// Why a handle was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidHandle {
    /// The handle is the empty string.
    Empty,
    /// The handle is longer than [`MAX_HANDLE_LENGTH`].
    TooLong {
        /// The rejected handle.
        handle: String,
    },
    /// The handle contains a character outside `[a-z0-9-]`.
    Char {
        /// The first offending character.
        ch: char,
        /// The rejected handle.
        handle: String,
    },
    /// The handle starts or ends with `-`.
    EdgeHyphen {
        /// The rejected handle.
        handle: String,
    },
}

impl fmt::Display for InvalidHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "handle cannot be empty"),
            Self::TooLong { handle } => write!(
                f,
                "handle `{handle}` is too long (max {MAX_HANDLE_LENGTH} characters)"
            ),
            Self::Char { ch, handle } => write!(
                f,
                "invalid character `{ch}` in handle `{handle}`, \
                 characters must be lowercase ASCII letters, digits, or `-`"
            ),
            Self::EdgeHyphen { handle } => {
                write!(f, "handle `{handle}` cannot start or end with `-`")
            }
        }
    }
}

impl std::error::Error for InvalidHandle {}

/// Check a candidate handle against the platform's naming rules.
///
/// # Errors
///
/// Returns the first rule the handle breaks.
pub fn validate(handle: &str) -> Result<(), InvalidHandle> {
    if handle.is_empty() {
        return Err(InvalidHandle::Empty);
    }

    if handle.chars().count() > MAX_HANDLE_LENGTH {
        return Err(InvalidHandle::TooLong {
            handle: handle.into(),
        });
    }

    if let Some(ch) = handle
        .chars()
        .find(|&ch| !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'))
    {
        return Err(InvalidHandle::Char {
            ch,
            handle: handle.into(),
        });
    }

    if handle.starts_with('-') || handle.ends_with('-') {
        return Err(InvalidHandle::EdgeHyphen {
            handle: handle.into(),
        });
    }

    Ok(())
}

/// Whether `handle` is a valid blog handle.
///
/// ```
/// use blog_avail::handle::is_valid;
/// assert!(is_valid("staff"));
/// assert!(!is_valid("-staff"));
/// ```
#[must_use]
pub fn is_valid(handle: &str) -> bool {
    validate(handle).is_ok()
}

/// A handle that has passed [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Validate `handle` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHandle`] if the handle breaks a naming rule.
    pub fn parse(handle: &str) -> Result<Self, InvalidHandle> {
        validate(handle)?;
        Ok(Self(handle.to_owned()))
    }

    /// The handle text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Handle {
    type Err = InvalidHandle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
