//! Switch coordinator: `spawn` and the bookkeeping half of `switch_to`.
//!
//! The scheduler never picks what runs next. Control moves only when the running
//! continuation names a target. A switch stores a one-shot wake sender under the
//! caller's id, takes the target's resume action out of the table, marks the target
//! current, then fires that action. Firing never polls the target in place: an unborn
//! target is handed to the host executor, a suspended one gets its wake signal, and
//! the executor runs it on its next turn.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, error, trace};

use crate::config::SchedulerConfig;
use crate::continuation::ContinuationHandle;
use crate::error::SwitchError;
use crate::ids::ContinuationId;
use crate::runtime::Host;
use crate::table::ContinuationTable;

/// Future produced by an entry action. Resolves only if the entry gave up control
/// without switching, which is always fatal.
pub type EntryFuture = LocalBoxFuture<'static, Result<(), SwitchError>>;

/// Entry action already bound to its payload; only the handle is missing.
pub type EntryThunk = Box<dyn FnOnce(ContinuationHandle) -> EntryFuture>;

/// What waking a continuation means.
pub enum ResumeAction {
    /// Never ran. Invoking starts the entry call on the host.
    Unstarted { entry: EntryThunk },
    /// Parked inside `switch_to`. Invoking resolves the signal it awaits.
    Resumable { wake: oneshot::Sender<()> },
}

impl fmt::Debug for ResumeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeAction::Unstarted { .. } => f.write_str("Unstarted"),
            ResumeAction::Resumable { .. } => f.write_str("Resumable"),
        }
    }
}

/// Observable lifecycle of a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    /// Spawned, never targeted.
    Unborn,
    /// The current continuation.
    Running,
    /// Parked in `switch_to`, waiting to be targeted.
    Suspended,
    /// Not current and not resumable: its entry terminated.
    Detached,
}

struct SchedulerState {
    table: ContinuationTable<ResumeAction>,
    current: ContinuationId,
    switches: u64,
    fatal: Option<SwitchError>,
    fatal_tx: Option<oneshot::Sender<SwitchError>>,
}

struct SchedulerInner {
    state: RefCell<SchedulerState>,
    host: Rc<dyn Host>,
    config: SchedulerConfig,
}

/// Shared handle to one scheduler. Cloning is cheap and every clone sees the same table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler whose only record is the main continuation, already current.
    pub fn new(host: Rc<dyn Host>, config: SchedulerConfig) -> Self {
        Scheduler {
            inner: Rc::new(SchedulerInner {
                state: RefCell::new(SchedulerState {
                    table: ContinuationTable::new(),
                    current: ContinuationId::MAIN,
                    switches: 0,
                    fatal: None,
                    fatal_tx: None,
                }),
                host,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Register a continuation that will run `entry(handle, payload)` the first time
    /// it is targeted. Nothing runs yet.
    pub fn spawn<F, Fut, P>(&self, entry: F, payload: P) -> ContinuationId
    where
        F: FnOnce(ContinuationHandle, P) -> Fut + 'static,
        Fut: Future<Output = Result<(), SwitchError>> + 'static,
        P: 'static,
    {
        let thunk: EntryThunk = Box::new(move |handle| entry(handle, payload).boxed_local());
        let mut state = self.inner.state.borrow_mut();
        let id = state.table.allocate();
        state.table.put(id, ResumeAction::Unstarted { entry: thunk });
        debug!("[{}] spawned {}", self.inner.config.label, id);
        id
    }

    /// Bookkeeping half of a switch from `caller` to `target`.
    ///
    /// On success the target is current and has been woken, and the returned receiver
    /// fires when some later switch targets `caller` again. On failure the caller stays
    /// current and running, and the switch is not counted. An unborn target the host
    /// refused to start is unborn again; a target whose suspend point was dropped can
    /// never be woken and is left detached.
    pub(crate) fn transfer(
        &self,
        caller: ContinuationId,
        target: ContinuationId,
    ) -> Result<oneshot::Receiver<()>, SwitchError> {
        let (action, receiver) = {
            let mut state = self.inner.state.borrow_mut();
            let caller_record = state.table.get(caller).ok_or_else(|| {
                SwitchError::internal(format!("switch from unknown continuation {caller}"))
            })?;
            if caller_record.has_resume() {
                return Err(SwitchError::already_paused(caller));
            }
            if state.current != caller {
                return Err(SwitchError::internal(format!(
                    "continuation {caller} switched while {} was current",
                    state.current
                )));
            }
            if target == caller {
                return Err(SwitchError::target_missing(target));
            }

            let (wake, receiver) = oneshot::channel();
            state.table.put(caller, ResumeAction::Resumable { wake });
            let Some(action) = state.table.take_resume(target) else {
                state.table.take_resume(caller);
                return Err(SwitchError::target_missing(target));
            };
            state.current = target;
            state.switches += 1;
            (action, receiver)
        };

        if self.inner.config.trace_switches {
            debug!(
                "[{}] switch {} -> {} ({:?})",
                self.inner.config.label, caller, target, action
            );
        }
        if let Err((err, restored)) = self.invoke(target, action) {
            self.roll_back(caller, target, restored);
            return Err(err);
        }
        Ok(receiver)
    }

    /// Fire a taken resume action. On failure, hands back whatever part of the action
    /// can still be stored for the target.
    fn invoke(
        &self,
        target: ContinuationId,
        action: ResumeAction,
    ) -> Result<(), (SwitchError, Option<ResumeAction>)> {
        match action {
            ResumeAction::Unstarted { entry } => {
                // the host drops a refused call unpolled, so the entry is still in the slot
                let slot = Rc::new(RefCell::new(Some(entry)));
                let pending = slot.clone();
                let handle = ContinuationHandle::new(target, self.clone());
                let scheduler = self.clone();
                let call = async move {
                    let Some(entry) = pending.borrow_mut().take() else {
                        return;
                    };
                    let error = match entry(handle).await {
                        Ok(()) => SwitchError::entrypoint_returned(target),
                        Err(err) => err,
                    };
                    scheduler.report_fatal(error);
                };
                self.inner.host.start(call.boxed_local()).map_err(|err| {
                    let entry = slot.borrow_mut().take();
                    (err, entry.map(|entry| ResumeAction::Unstarted { entry }))
                })
            }
            ResumeAction::Resumable { wake } => wake.send(()).map_err(|_| {
                let err = SwitchError::internal(format!(
                    "continuation {target} dropped its suspend point"
                ));
                (err, None)
            }),
        }
    }

    /// Undo the bookkeeping of a switch whose resume action could not be fired.
    fn roll_back(
        &self,
        caller: ContinuationId,
        target: ContinuationId,
        restored: Option<ResumeAction>,
    ) {
        let mut state = self.inner.state.borrow_mut();
        state.table.take_resume(caller);
        if let Some(action) = restored {
            state.table.put(target, action);
        }
        state.current = caller;
        state.switches -= 1;
        debug!(
            "[{}] switch {} -> {} rolled back",
            self.inner.config.label, caller, target
        );
    }

    /// Record a fatal violation raised inside a spawned continuation. The first one
    /// wins and is forwarded to whoever holds the fatal signal.
    pub(crate) fn report_fatal(&self, err: SwitchError) {
        let mut state = self.inner.state.borrow_mut();
        if state.fatal.is_some() {
            error!(
                "[{}] further fatal violation ignored: {}",
                self.inner.config.label, err
            );
            return;
        }
        error!("[{}] fatal violation: {}", self.inner.config.label, err);
        state.fatal = Some(err.clone());
        if let Some(tx) = state.fatal_tx.take() {
            let _ = tx.send(err);
        }
    }

    /// Receiver for the first fatal violation. Replaces any earlier receiver.
    pub(crate) fn fatal_signal(&self) -> oneshot::Receiver<SwitchError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.borrow_mut();
        match state.fatal.clone() {
            Some(err) => {
                let _ = tx.send(err);
            }
            None => state.fatal_tx = Some(tx),
        }
        rx
    }

    pub fn fatal_error(&self) -> Option<SwitchError> {
        self.inner.state.borrow().fatal.clone()
    }

    pub fn current(&self) -> ContinuationId {
        self.inner.state.borrow().current
    }

    pub fn state(&self, id: ContinuationId) -> Option<ContinuationState> {
        let state = self.inner.state.borrow();
        let record = state.table.get(id)?;
        let observed = match record.resume() {
            Some(ResumeAction::Unstarted { .. }) => ContinuationState::Unborn,
            Some(ResumeAction::Resumable { .. }) => ContinuationState::Suspended,
            None if id == state.current => ContinuationState::Running,
            None => ContinuationState::Detached,
        };
        trace!("state({}) = {:?}", id, observed);
        Some(observed)
    }

    pub fn exists(&self, id: ContinuationId) -> bool {
        self.inner.state.borrow().table.exists(id)
    }

    /// Ids whose record holds no resume action. While the run is healthy this is
    /// exactly `[current]`.
    pub fn without_resume(&self) -> Vec<ContinuationId> {
        self.inner.state.borrow().table.without_resume()
    }

    pub fn ids(&self) -> Vec<ContinuationId> {
        self.inner.state.borrow().table.ids()
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().table.is_empty()
    }

    /// Number of successful switches so far.
    pub fn switch_count(&self) -> u64 {
        self.inner.state.borrow().switches
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Scheduler")
            .field("label", &self.inner.config.label)
            .field("current", &state.current)
            .field("table", &state.table)
            .field("switches", &state.switches)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Host that keeps started calls instead of running them.
    #[derive(Default)]
    struct RecordingHost {
        started: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
        refuse: Cell<bool>,
    }

    impl Host for RecordingHost {
        fn start(&self, call: LocalBoxFuture<'static, ()>) -> Result<(), SwitchError> {
            if self.refuse.get() {
                return Err(SwitchError::internal("host is shut down"));
            }
            self.started.borrow_mut().push(call);
            Ok(())
        }
    }

    fn scheduler() -> (Scheduler, Rc<RecordingHost>) {
        let host = Rc::new(RecordingHost::default());
        let scheduler = Scheduler::new(host.clone(), SchedulerConfig::default());
        (scheduler, host)
    }

    async fn idle(_handle: ContinuationHandle, _payload: ()) -> Result<(), SwitchError> {
        futures::future::pending().await
    }

    fn assert_single_owner(scheduler: &Scheduler) {
        assert_eq!(scheduler.without_resume(), vec![scheduler.current()]);
    }

    #[test]
    fn test_initial_state() {
        let (scheduler, _) = scheduler();
        assert_eq!(scheduler.current(), ContinuationId::MAIN);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Running)
        );
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_spawn_is_lazy_and_monotonic() {
        let (scheduler, host) = scheduler();
        let ids: Vec<_> = (0..4).map(|_| scheduler.spawn(idle, ())).collect();
        assert_eq!(ids[0], ContinuationId(1));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(host.started.borrow().is_empty());
        for id in ids {
            assert_eq!(scheduler.state(id), Some(ContinuationState::Unborn));
        }
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_transfer_to_unborn_starts_it_on_host() {
        let (scheduler, host) = scheduler();
        let a = scheduler.spawn(idle, ());

        let _wake = scheduler.transfer(ContinuationId::MAIN, a).unwrap();

        assert_eq!(scheduler.current(), a);
        assert_eq!(host.started.borrow().len(), 1);
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Suspended)
        );
        assert_eq!(scheduler.state(a), Some(ContinuationState::Running));
        assert_eq!(scheduler.switch_count(), 1);
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_transfer_back_fires_wake() {
        let (scheduler, host) = scheduler();
        let a = scheduler.spawn(idle, ());

        let mut main_wake = scheduler.transfer(ContinuationId::MAIN, a).unwrap();
        assert_eq!(main_wake.try_recv(), Ok(None));

        let _a_wake = scheduler.transfer(a, ContinuationId::MAIN).unwrap();
        assert_eq!(main_wake.try_recv(), Ok(Some(())));
        assert_eq!(scheduler.current(), ContinuationId::MAIN);
        assert_eq!(scheduler.state(a), Some(ContinuationState::Suspended));
        // a is suspended, not restarted
        assert_eq!(host.started.borrow().len(), 1);
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_switch_to_running_target_is_missing() {
        let (scheduler, _) = scheduler();
        let a = scheduler.spawn(idle, ());
        let _wake = scheduler.transfer(ContinuationId::MAIN, a).unwrap();

        let err = scheduler.transfer(a, a).unwrap_err();
        assert_eq!(err, SwitchError::target_missing(a));
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_switch_to_unknown_target_leaves_table_untouched() {
        let (scheduler, _) = scheduler();
        let err = scheduler
            .transfer(ContinuationId::MAIN, ContinuationId(42))
            .unwrap_err();
        assert_eq!(err, SwitchError::target_missing(ContinuationId(42)));
        assert_eq!(scheduler.current(), ContinuationId::MAIN);
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Running)
        );
        assert_eq!(scheduler.switch_count(), 0);
    }

    #[test]
    fn test_suspended_caller_is_already_paused() {
        let (scheduler, _) = scheduler();
        let a = scheduler.spawn(idle, ());
        let b = scheduler.spawn(idle, ());
        let _wake = scheduler.transfer(ContinuationId::MAIN, a).unwrap();

        let err = scheduler.transfer(ContinuationId::MAIN, b).unwrap_err();
        assert_eq!(err, SwitchError::already_paused(ContinuationId::MAIN));
        assert_eq!(scheduler.current(), a);
        assert_eq!(scheduler.state(b), Some(ContinuationState::Unborn));
    }

    #[test]
    fn test_dropped_suspend_point_is_internal() {
        let (scheduler, _) = scheduler();
        let a = scheduler.spawn(idle, ());
        drop(scheduler.transfer(ContinuationId::MAIN, a).unwrap());

        let err = scheduler.transfer(a, ContinuationId::MAIN).unwrap_err();
        assert!(matches!(err, SwitchError::Internal { .. }));

        // a keeps running; main can never be woken again
        assert_eq!(scheduler.current(), a);
        assert_eq!(scheduler.state(a), Some(ContinuationState::Running));
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Detached)
        );
        assert_eq!(scheduler.switch_count(), 1);
    }

    #[test]
    fn test_switch_to_detached_target_is_missing() {
        let (scheduler, _) = scheduler();
        let a = scheduler.spawn(idle, ());
        drop(scheduler.transfer(ContinuationId::MAIN, a).unwrap());
        scheduler.transfer(a, ContinuationId::MAIN).unwrap_err();
        assert!(scheduler.exists(ContinuationId::MAIN));

        let err = scheduler.transfer(a, ContinuationId::MAIN).unwrap_err();
        assert_eq!(err, SwitchError::target_missing(ContinuationId::MAIN));
        assert_eq!(scheduler.current(), a);
        assert_eq!(scheduler.state(a), Some(ContinuationState::Running));
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Detached)
        );
        assert_eq!(scheduler.switch_count(), 1);
    }

    #[test]
    fn test_host_refusal_is_reported() {
        let (scheduler, host) = scheduler();
        let a = scheduler.spawn(idle, ());
        host.refuse.set(true);
        let err = scheduler.transfer(ContinuationId::MAIN, a).unwrap_err();
        assert!(matches!(err, SwitchError::Internal { .. }));

        assert_eq!(scheduler.current(), ContinuationId::MAIN);
        assert_eq!(
            scheduler.state(ContinuationId::MAIN),
            Some(ContinuationState::Running)
        );
        assert_eq!(scheduler.state(a), Some(ContinuationState::Unborn));
        assert_eq!(scheduler.switch_count(), 0);
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_refused_switch_can_be_retried() {
        let (scheduler, host) = scheduler();
        let a = scheduler.spawn(idle, ());
        host.refuse.set(true);
        scheduler.transfer(ContinuationId::MAIN, a).unwrap_err();
        host.refuse.set(false);

        let _wake = scheduler.transfer(ContinuationId::MAIN, a).unwrap();
        assert_eq!(scheduler.current(), a);
        assert_eq!(scheduler.state(a), Some(ContinuationState::Running));
        assert_eq!(host.started.borrow().len(), 1);
        assert_eq!(scheduler.switch_count(), 1);
        assert_single_owner(&scheduler);
    }

    #[test]
    fn test_first_fatal_wins() {
        let (scheduler, _) = scheduler();
        let mut signal = scheduler.fatal_signal();
        scheduler.report_fatal(SwitchError::entrypoint_returned(ContinuationId(1)));
        scheduler.report_fatal(SwitchError::target_missing(ContinuationId(9)));

        assert_eq!(
            signal.try_recv(),
            Ok(Some(SwitchError::entrypoint_returned(ContinuationId(1))))
        );
        assert_eq!(
            scheduler.fatal_error(),
            Some(SwitchError::entrypoint_returned(ContinuationId(1)))
        );
    }

    #[test]
    fn test_fatal_signal_after_report_fires_immediately() {
        let (scheduler, _) = scheduler();
        scheduler.report_fatal(SwitchError::already_paused(ContinuationId(3)));
        let mut signal = scheduler.fatal_signal();
        assert_eq!(
            signal.try_recv(),
            Ok(Some(SwitchError::already_paused(ContinuationId(3))))
        );
    }
}
