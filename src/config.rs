//! Credentials, platform constants, and request pacing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Errors loading or validating configuration.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A configuration file could not be read.
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// A configuration file is not the expected JSON.
    Parse {
        /// The file that failed.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
    /// The delay range is negative, non-finite, or inverted.
    Delay(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "reading `{}`: {source}", path.display()),
            Self::Parse { path, source } => write!(f, "parsing `{}`: {source}", path.display()),
            Self::Delay(msg) => write!(f, "invalid delay: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Delay(_) => None,
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Login credentials, loaded from a JSON file with `email` and `password` keys.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Build credentials directly.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Load credentials from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or lacks either key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything specific to the hosting platform: endpoints, form ids, and the
/// strings the classifier looks for in blog pages.
///
/// Defaults target Tumblr. Any subset of fields can be overridden from a JSON
/// file, which is also how the tool is pointed at a mock service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Platform {
    /// Page holding the login form.
    pub login_url: String,
    /// `id` attribute of the login form on [`login_url`](Self::login_url).
    pub login_form_id: String,
    /// Visiting this URL ends the session.
    pub logout_url: String,
    /// Endpoint answering whether a handle can be registered.
    pub availability_url: String,
    /// `Origin` header sent to the availability endpoint.
    pub origin: String,
    /// `Referer` header sent to the availability endpoint.
    pub referer: String,
    /// Blog address; `{handle}` is replaced by the handle being checked.
    pub blog_url: String,
    /// Availability response body meaning "available".
    pub available_sentinel: String,
    /// Prefix of a blog page that exists but is blocked from public view.
    pub taken_marker: String,
    /// Substring of a blog page asking for a blog password.
    pub password_marker: String,
    /// Prefix of a `Location` header sending a visitor to log in first.
    pub login_required_prefix: String,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            login_url: "https://www.tumblr.com/login".into(),
            login_form_id: "signup_form".into(),
            logout_url: "https://www.tumblr.com/logout".into(),
            availability_url: "https://www.tumblr.com/check_if_tumblelog_name_is_available"
                .into(),
            origin: "https://www.tumblr.com".into(),
            referer: "https://www.tumblr.com/new/blog".into(),
            blog_url: "https://{handle}.tumblr.com/".into(),
            available_sentinel: "1".into(),
            taken_marker: "<!DOCTYPE html><html><head><title>Blog not available".into(),
            password_marker: "id=\"auth_password\"".into(),
            login_required_prefix: "https://www.tumblr.com/login_required/".into(),
        }
    }
}

impl Platform {
    /// Load a platform description, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// The blog page address for `handle`.
    ///
    /// ```
    /// use blog_avail::config::Platform;
    /// assert_eq!(Platform::default().blog_url_for("staff"), "https://staff.tumblr.com/");
    /// ```
    #[must_use]
    pub fn blog_url_for(&self, handle: &str) -> String {
        self.blog_url.replace("{handle}", handle)
    }
}

/// Default lower bound of the pause between checks, in seconds.
pub const DEFAULT_MIN_DELAY: f64 = 1.0;
/// Default upper bound of the pause between checks, in seconds.
pub const DEFAULT_MAX_DELAY: f64 = 3.0;

/// Closed range the randomized pause between checks is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    /// Build a range from two durations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Delay`] if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::Delay(format!(
                "minimum {min:?} is greater than maximum {max:?}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Build a range from seconds, as given on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Delay`] for negative or non-finite values, or an
    /// inverted range.
    pub fn from_secs(min: f64, max: f64) -> Result<Self, ConfigError> {
        let secs = |value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|e| ConfigError::Delay(format!("{value} seconds: {e}")))
        };
        Self::new(secs(min)?, secs(max)?)
    }

    /// No pause at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a pause uniformly from the range (millisecond resolution).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_secs_f64(DEFAULT_MIN_DELAY),
            max: Duration::from_secs_f64(DEFAULT_MAX_DELAY),
        }
    }
}
