//! Sequential checking of many handles with randomized pauses.

use std::time::Duration;

use tracing::debug;

use crate::check::{CheckError, Outcome, check};
use crate::config::{Pacing, Platform};
use crate::handle::{Handle, InvalidHandle};
use crate::session::Transport;

/// Split raw inputs into valid handles and rejected ones, keeping order.
pub fn partition<I, S>(names: I) -> (Vec<Handle>, Vec<(String, InvalidHandle)>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for name in names {
        let name = name.as_ref();
        match Handle::parse(name) {
            Ok(handle) => valid.push(handle),
            Err(e) => invalid.push((name.to_owned(), e)),
        }
    }
    (valid, invalid)
}

/// Observer for a running batch.
pub trait Progress {
    /// Called before `handle` is checked.
    fn checking(&mut self, _handle: &Handle) {}

    /// Called with the outcome of `handle`.
    fn checked(&mut self, handle: &Handle, outcome: Outcome);

    /// Wait out a pause between checks.
    fn pause(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Checks handles one at a time over a single transport.
#[derive(Debug)]
pub struct Batch<'a, T> {
    transport: &'a T,
    platform: &'a Platform,
    pacing: Pacing,
}

impl<'a, T: Transport> Batch<'a, T> {
    /// Create a batch over `transport`.
    pub fn new(transport: &'a T, platform: &'a Platform, pacing: Pacing) -> Self {
        Self {
            transport,
            platform,
            pacing,
        }
    }

    /// Check every handle in order, pausing between checks.
    ///
    /// No pause follows the last handle, or a handle whose blog page alone
    /// proved it taken.
    ///
    /// # Errors
    ///
    /// Stops at the first failed check and returns its error.
    pub fn run<P: Progress + ?Sized>(
        &self,
        handles: &[Handle],
        progress: &mut P,
    ) -> Result<(), CheckError> {
        let mut rng = rand::thread_rng();
        for (i, handle) in handles.iter().enumerate() {
            progress.checking(handle);
            let outcome = check(self.transport, self.platform, handle)?;
            progress.checked(handle, outcome);

            let last = i + 1 == handles.len();
            if last || outcome.is_conclusively_taken() {
                continue;
            }
            let delay = self.pacing.sample(&mut rng);
            debug!(?delay, "pausing before next check");
            progress.pause(delay);
        }
        Ok(())
    }
}
