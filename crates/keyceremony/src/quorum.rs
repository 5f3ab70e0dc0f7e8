//! quorum driver
//!
//! feeds shares one at a time into a submit function until the server
//! reports completion. the same loop backs quick unseal, quick rekey and
//! quick root generation.

use tracing::debug;

use crate::session::SessionState;
use crate::share::KeyShare;
use crate::{Error, Result};

/// submit `shares` in order until a snapshot reports `complete`
///
/// returns the completing snapshot. no share is submitted after completion.
/// errors from `submit_one` are returned as-is; the caller decides whether
/// to re-read status and restart.
///
/// fails with `InsufficientShares` when the list runs out first, reporting
/// how many shares were submitted and the last threshold the server
/// reported (0 if nothing was submitted).
pub fn run_to_completion<F>(shares: &[KeyShare], mut submit_one: F) -> Result<SessionState>
where
    F: FnMut(&KeyShare) -> Result<SessionState>,
{
    let mut threshold = 0;

    for (i, share) in shares.iter().enumerate() {
        let state = submit_one(share)?;
        debug!(
            "{} share {}/{}: provided {} of {}",
            state.kind(),
            i + 1,
            shares.len(),
            state.provided,
            state.threshold
        );

        if state.complete {
            return Ok(state);
        }
        threshold = state.threshold;
    }

    Err(Error::InsufficientShares {
        provided: shares.len(),
        threshold: threshold as usize,
    })
}
