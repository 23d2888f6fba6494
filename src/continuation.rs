//! Handle given to every continuation body.
//!
//! A handle carries the id of the continuation that owns it, so a switch always knows
//! who is being suspended instead of trusting whichever id happens to be current.

use std::fmt;
use std::future::Future;

use crate::error::SwitchError;
use crate::ids::ContinuationId;
use crate::scheduler::{ContinuationState, Scheduler};

#[derive(Clone)]
pub struct ContinuationHandle {
    id: ContinuationId,
    scheduler: Scheduler,
}

impl ContinuationHandle {
    pub(crate) fn new(id: ContinuationId, scheduler: Scheduler) -> Self {
        ContinuationHandle { id, scheduler }
    }

    pub fn id(&self) -> ContinuationId {
        self.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_current(&self) -> bool {
        self.scheduler.current() == self.id
    }

    pub fn state(&self) -> Option<ContinuationState> {
        self.scheduler.state(self.id)
    }

    /// Same as [`Scheduler::spawn`].
    pub fn spawn<F, Fut, P>(&self, entry: F, payload: P) -> ContinuationId
    where
        F: FnOnce(ContinuationHandle, P) -> Fut + 'static,
        Fut: Future<Output = Result<(), SwitchError>> + 'static,
        P: 'static,
    {
        self.scheduler.spawn(entry, payload)
    }

    /// Suspend this continuation and hand control to `target`.
    ///
    /// The switch happens when the returned future is first polled. It resolves once a
    /// later `switch_to` names this continuation again; nothing is delivered across the
    /// switch. Every error is fatal and should be propagated with `?`.
    pub async fn switch_to(&self, target: ContinuationId) -> Result<(), SwitchError> {
        let wake = self.scheduler.transfer(self.id, target)?;
        wake.await.map_err(|_| {
            SwitchError::internal(format!(
                "wake signal for continuation {} was dropped",
                self.id
            ))
        })
    }
}

impl fmt::Debug for ContinuationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationHandle")
            .field("id", &self.id)
            .field("current", &self.scheduler.current())
            .finish()
    }
}
