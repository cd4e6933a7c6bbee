//! Authenticated HTTP session against the blogging platform.
//!
//! [`Session`] owns a cookie-carrying HTTP agent that has logged in through
//! the platform's login form. It follows redirects itself so that every
//! `Location` header along the way is visible to the classifier, and it
//! logs out when dropped.

use std::fmt;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use ureq::Agent;
use ureq::http::Response;
use url::Url;

use crate::config::{Credentials, Platform};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect hops followed before the last 3xx response is returned as-is.
pub const MAX_REDIRECTS: usize = 10;

/// A fetched page, independent of the HTTP library that fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    /// Final status code.
    pub status: u16,
    /// Final response body.
    pub body: String,
    /// `Location` headers of every redirect followed, in order.
    pub redirects: Vec<String>,
}

impl Page {
    /// Whether the final status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The requests the classifier needs. Non-2xx responses are returned as
/// [`Page`]s; only transport failures are errors.
pub trait Transport {
    /// Fetch `url`, following redirects.
    ///
    /// # Errors
    ///
    /// Returns the transport error if no response was received.
    fn get(&self, url: &str) -> Result<Page, ureq::Error>;

    /// Submit a urlencoded form to `url` with extra request headers,
    /// following redirects.
    ///
    /// # Errors
    ///
    /// Returns the transport error if no response was received.
    fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page, ureq::Error>;
}

/// Login did not succeed.
#[derive(Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// A network error interrupted the login exchange.
    Transport(Box<ureq::Error>),
    /// The login page or form submission answered with a non-2xx status.
    Rejected {
        /// The status received.
        status: u16,
    },
    /// The login page has no form with the expected id.
    FormMissing {
        /// The id that was looked for.
        form_id: String,
    },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "login failure: {e}"),
            Self::Rejected { status } => write!(f, "login failure: HTTP {status}"),
            Self::FormMissing { form_id } => {
                write!(f, "login failure: no form `#{form_id}` on the login page")
            }
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ureq::Error> for AuthError {
    fn from(e: ureq::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

/// An HTTP agent logged in to the platform.
///
/// Cookies from the login are reused by every request. The session is logged
/// out by [`Session::logout`], or on drop if that was never called.
#[derive(Debug)]
pub struct Session {
    agent: Agent,
    logout_url: String,
    logged_in: bool,
}

impl Session {
    /// Log in with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the login page cannot be fetched, has no login
    /// form, or the form submission is not accepted.
    pub fn login(credentials: &Credentials, platform: &Platform) -> Result<Self, AuthError> {
        let mut session = Self {
            agent: new_agent(),
            logout_url: platform.logout_url.clone(),
            logged_in: false,
        };

        let page = session.get(&platform.login_url)?;
        if !page.is_success() {
            return Err(AuthError::Rejected {
                status: page.status,
            });
        }

        let (action, mut form) = login_form(&page, &platform.login_form_id).ok_or_else(|| {
            AuthError::FormMissing {
                form_id: platform.login_form_id.clone(),
            }
        })?;
        let action: String = resolve(&page.url, &action).map_err(bad_uri)?.into();
        overlay(&mut form, "determine_email", &credentials.email);
        overlay(&mut form, "user[email]", &credentials.email);
        overlay(&mut form, "user[password]", &credentials.password);

        debug!(action = %action, fields = form.len(), "submitting login form");
        let reply = session.post_form(&action, &form, &[])?;
        if !reply.is_success() {
            return Err(AuthError::Rejected {
                status: reply.status,
            });
        }

        session.logged_in = true;
        info!(email = %credentials.email, "logged in");
        Ok(session)
    }

    /// Log in, run `f` with the session, and log out whatever `f` returns.
    ///
    /// If `f` panics the session is still logged out when it is dropped.
    ///
    /// # Errors
    ///
    /// Returns the login error, or whatever `f` returns.
    pub fn scoped<R, E, F>(credentials: &Credentials, platform: &Platform, f: F) -> Result<R, E>
    where
        E: From<AuthError>,
        F: FnOnce(&Session) -> Result<R, E>,
    {
        let session = Self::login(credentials, platform)?;
        let result = f(&session);
        if let Err(e) = session.logout() {
            warn!(error = %e, "logout failed");
        }
        result
    }

    /// Whether the session is still logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the logout request could not be made.
    pub fn logout(mut self) -> Result<(), ureq::Error> {
        self.end()
    }

    fn end(&mut self) -> Result<(), ureq::Error> {
        if !self.logged_in {
            return Ok(());
        }
        self.logged_in = false;
        let page = self.get(&self.logout_url)?;
        info!(status = page.status, "logged out");
        Ok(())
    }

    fn follow(&self, url: &str, mut response: Response<ureq::Body>) -> Result<Page, ureq::Error> {
        let mut url = url.to_owned();
        let mut redirects = Vec::new();
        while response.status().is_redirection() && redirects.len() < MAX_REDIRECTS {
            let Some(location) = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
            else {
                break;
            };
            url = resolve(&url, &location).map_err(bad_uri)?.into();
            debug!(
                status = response.status().as_u16(),
                location = %location,
                "following redirect"
            );
            redirects.push(location);
            response = self.agent.get(&url).call()?;
        }

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        debug!(url = %url, status, bytes = body.len(), "fetched");
        Ok(Page {
            url,
            status,
            body,
            redirects,
        })
    }
}

impl Transport for Session {
    fn get(&self, url: &str) -> Result<Page, ureq::Error> {
        let response = self.agent.get(url).call()?;
        self.follow(url, response)
    }

    fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page, ureq::Error> {
        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send_form(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        self.follow(url, response)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            warn!(error = %e, "logout on drop failed");
        }
    }
}

fn new_agent() -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(REQUEST_TIMEOUT))
        .max_redirects(0)
        .http_status_as_error(false)
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build();
    Agent::new_with_config(config)
}

/// Find the form with `id` on `page` and collect its named inputs with their
/// default values. Returns the form action as written alongside the fields.
fn login_form(page: &Page, id: &str) -> Option<(String, Vec<(String, String)>)> {
    let document = Html::parse_document(&page.body);
    let form_selector = Selector::parse(&format!("form[id=\"{id}\"]")).ok()?;
    let input_selector = Selector::parse("input").ok()?;

    let form = document.select(&form_selector).next()?;
    let action = form.value().attr("action").unwrap_or("");
    let fields = form
        .select(&input_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_owned(), value.to_owned()))
        })
        .collect();
    Some((action.to_owned(), fields))
}

fn overlay(form: &mut Vec<(String, String)>, name: &str, value: &str) {
    match form.iter_mut().find(|(k, _)| k == name) {
        Some(field) => field.1 = value.to_owned(),
        None => form.push((name.to_owned(), value.to_owned())),
    }
}

/// Resolve a `Location` header or form action against the URL it came from.
fn resolve(base: &str, reference: &str) -> Result<Url, url::ParseError> {
    Url::parse(reference).or_else(|_| Url::parse(base)?.join(reference))
}

fn bad_uri(e: url::ParseError) -> ureq::Error {
    ureq::Error::BadUri(e.to_string())
}
