//! Availability classification for blog handles.
//!
//! A check combines three signals that do not always agree: the platform's
//! availability endpoint, the status of the handle's blog page, and markers
//! inside that page. The page is probed first; if it alone proves the handle
//! is taken, the rate-limited endpoint is never called.

use std::fmt;

use tracing::{debug, info};

use crate::config::Platform;
use crate::handle::{Handle, InvalidHandle};
use crate::session::{Page, Transport};

/// The classification of one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
#[non_exhaustive]
pub enum Outcome {
    /// The endpoint says available and the blog page does not exist.
    Available,
    /// The blog page does not exist but the endpoint refuses the handle:
    /// reserved or blocked.
    Purgatory,
    /// The endpoint says available, yet a page without the taken marker
    /// exists. Not to be trusted.
    CursedPurgatory,
    /// The blog exists but is blocked from public view.
    Taken,
    /// The blog exists and asks for a password.
    PasswordProtected,
    /// The blog exists and redirects visitors to log in.
    Private,
    /// No rule matched; carries the endpoint's verdict for review.
    Mystery {
        /// What the availability endpoint said.
        api_available: bool,
    },
}

impl Outcome {
    /// Whether the handle can be registered.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Whether the blog page alone proved the handle taken, so the
    /// availability endpoint was not consulted.
    #[must_use]
    pub fn is_conclusively_taken(&self) -> bool {
        matches!(self, Self::Taken | Self::PasswordProtected | Self::Private)
    }

    /// Short label used in output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Purgatory => "purgatory",
            Self::CursedPurgatory => "cursed-purgatory",
            Self::Taken => "taken",
            Self::PasswordProtected => "password-protected",
            Self::Private => "private",
            Self::Mystery {
                api_available: false,
            } => "mystery-taken",
            Self::Mystery {
                api_available: true,
            } => "mystery-untaken",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Evidence taken from a handle's blog page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// The page answered 404.
    pub not_found: bool,
    /// The body starts with the "exists but blocked" marker.
    pub confirmed_taken: bool,
    /// The body holds a blog password form (and neither of the above holds).
    pub password_protected: bool,
    /// A redirect on the way pointed at the login-required page.
    pub private: bool,
}

impl Signals {
    /// Derive signals from a probed blog page.
    pub fn from_page(page: &Page, platform: &Platform) -> Self {
        let not_found = page.status == 404;
        let confirmed_taken =
            !platform.taken_marker.is_empty() && page.body.starts_with(&platform.taken_marker);
        let password_protected = !not_found
            && !confirmed_taken
            && !platform.password_marker.is_empty()
            && page.body.contains(&platform.password_marker);
        let private = !platform.login_required_prefix.is_empty()
            && page
                .redirects
                .iter()
                .any(|location| location.starts_with(&platform.login_required_prefix));
        Self {
            not_found,
            confirmed_taken,
            password_protected,
            private,
        }
    }

    /// The outcome the page proves on its own, if any.
    ///
    /// Precedence: taken marker, then password form, then login redirect.
    /// Never conclusive for a missing page.
    #[must_use]
    pub fn conclusive(&self) -> Option<Outcome> {
        if self.not_found {
            None
        } else if self.confirmed_taken {
            Some(Outcome::Taken)
        } else if self.password_protected {
            Some(Outcome::PasswordProtected)
        } else if self.private {
            Some(Outcome::Private)
        } else {
            None
        }
    }
}

/// Combine the availability endpoint's verdict with the page signals.
///
/// Rules are tried in order; anything they do not cover is a
/// [`Outcome::Mystery`].
///
/// ```
/// use blog_avail::check::{reconcile, Outcome, Signals};
///
/// let missing = Signals { not_found: true, ..Signals::default() };
/// assert_eq!(reconcile(true, &missing), Outcome::Available);
/// assert_eq!(reconcile(false, &missing), Outcome::Purgatory);
/// ```
pub fn reconcile(api_available: bool, signals: &Signals) -> Outcome {
    match (api_available, signals.not_found, signals.confirmed_taken) {
        (true, true, _) => Outcome::Available,
        (false, true, _) => Outcome::Purgatory,
        (true, false, false) => Outcome::CursedPurgatory,
        (false, _, true) => Outcome::Taken,
        _ => Outcome::Mystery { api_available },
    }
}

/// A required request failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum ServiceError {
    /// The blog page could not be fetched.
    Probe(Box<ureq::Error>),
    /// The availability endpoint could not be reached.
    Api(Box<ureq::Error>),
    /// The availability endpoint answered with a non-2xx status.
    ApiStatus {
        /// The status received.
        status: u16,
    },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe(e) => write!(f, "fetching blog page: {e}"),
            Self::Api(e) => write!(f, "availability check: {e}"),
            Self::ApiStatus { status } => write!(f, "availability check: HTTP {status}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Probe(e) | Self::Api(e) => Some(e.as_ref()),
            Self::ApiStatus { .. } => None,
        }
    }
}

/// Errors that can occur when checking a handle.
#[derive(Debug)]
#[non_exhaustive]
pub enum CheckError {
    /// The handle breaks a naming rule; nothing was requested.
    InvalidHandle(InvalidHandle),
    /// A required request failed.
    Service(ServiceError),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle(e) => write!(f, "invalid: {e}"),
            Self::Service(e) => write!(f, "service error: {e}"),
        }
    }
}

impl std::error::Error for CheckError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidHandle(e) => Some(e),
            Self::Service(e) => Some(e),
        }
    }
}

impl From<InvalidHandle> for CheckError {
    fn from(e: InvalidHandle) -> Self {
        Self::InvalidHandle(e)
    }
}

impl From<ServiceError> for CheckError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

/// Check whether a handle is available.
///
/// Validates the handle before any request, then classifies it with
/// [`check`].
///
/// # Errors
///
/// Returns [`CheckError::InvalidHandle`] without touching the network if the
/// handle is invalid, or [`CheckError::Service`] if a required request fails.
///
/// # Example
///
/// ```no_run
/// use blog_avail::check::check_handle;
/// use blog_avail::config::{Credentials, Platform};
/// use blog_avail::session::Session;
///
/// let platform = Platform::default();
/// let creds = Credentials::load("creds.json")?;
/// let session = Session::login(&creds, &platform)?;
/// println!("{}", check_handle(&session, &platform, "staff")?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn check_handle<T: Transport>(
    transport: &T,
    platform: &Platform,
    handle: &str,
) -> Result<Outcome, CheckError> {
    let handle = Handle::parse(handle)?;
    Ok(check(transport, platform, &handle)?)
}

/// Classify an already validated handle.
///
/// Makes one request if the blog page is conclusive, two otherwise.
///
/// # Errors
///
/// Returns [`ServiceError`] if the page cannot be fetched or the availability
/// endpoint fails. Non-2xx blog pages are signals, not errors.
pub fn check<T: Transport>(
    transport: &T,
    platform: &Platform,
    handle: &Handle,
) -> Result<Outcome, ServiceError> {
    let page = transport
        .get(&platform.blog_url_for(handle.as_str()))
        .map_err(|e| ServiceError::Probe(Box::new(e)))?;
    let signals = Signals::from_page(&page, platform);
    debug!(%handle, status = page.status, ?signals, "probed blog page");

    if let Some(outcome) = signals.conclusive() {
        info!(%handle, %outcome, "page is conclusive");
        return Ok(outcome);
    }

    let api_available = ask_api(transport, platform, handle)?;
    let outcome = reconcile(api_available, &signals);
    info!(%handle, api_available, %outcome, "classified");
    Ok(outcome)
}

fn ask_api<T: Transport>(
    transport: &T,
    platform: &Platform,
    handle: &Handle,
) -> Result<bool, ServiceError> {
    let form = [("name".to_owned(), handle.as_str().to_owned())];
    let headers = [
        ("Origin", platform.origin.as_str()),
        ("Referer", platform.referer.as_str()),
        ("X-Requested-With", "XMLHttpRequest"),
    ];
    let reply = transport
        .post_form(&platform.availability_url, &form, &headers)
        .map_err(|e| ServiceError::Api(Box::new(e)))?;
    if !reply.is_success() {
        return Err(ServiceError::ApiStatus {
            status: reply.status,
        });
    }
    debug!(%handle, body = %reply.body, "availability endpoint answered");
    Ok(reply.body == platform.available_sentinel)
}
