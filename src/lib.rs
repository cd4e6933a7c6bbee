#![warn(missing_docs, missing_debug_implementations)]

//! Check whether blog handles are available on Tumblr.
//!
//! The platform's availability endpoint is not always right, so each handle's
//! blog page is probed as well and the two are reconciled into an
//! [`Outcome`](check::Outcome). Pages that are plainly taken (blocked,
//! password protected, or login-only) settle the question without calling the
//! rate-limited endpoint at all.
//!
//! # Example
//!
//! ```no_run
//! use blog_avail::check::{check_handle, Outcome};
//! use blog_avail::config::{Credentials, Platform};
//! use blog_avail::session::Session;
//!
//! let platform = Platform::default();
//! let creds = Credentials::load("creds.json")?;
//! let outcome = Session::scoped(&creds, &platform, |session| {
//!     Ok::<_, Box<dyn std::error::Error>>(check_handle(session, &platform, "my-new-blog")?)
//! })?;
//! match outcome {
//!     Outcome::Available => println!("Handle is available!"),
//!     other => println!("{other}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod batch;
pub mod check;
pub mod config;
pub mod handle;
pub mod session;
