//! Host event loop: the suspend-capable call primitive and the main entry.
//!
//! Every continuation body is an `async` call driven by one `LocalPool`. A body parks at
//! the `.await` inside `switch_to` and the pool polls it again once its wake signal
//! fires, so the pool never needs to know about stacks or about which continuation is
//! current.

use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, Either, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use log::{debug, info};

use crate::config::SchedulerConfig;
use crate::continuation::ContinuationHandle;
use crate::error::SwitchError;
use crate::ids::ContinuationId;
use crate::scheduler::Scheduler;

/// Starts a suspend-capable call. The call must not be polled before `start` returns.
pub trait Host {
    fn start(&self, call: LocalBoxFuture<'static, ()>) -> Result<(), SwitchError>;
}

impl Host for LocalSpawner {
    fn start(&self, call: LocalBoxFuture<'static, ()>) -> Result<(), SwitchError> {
        self.spawn_local(call)
            .map_err(|err| SwitchError::internal(format!("host refused to start call: {err}")))
    }
}

/// Owns the event loop and the scheduler it drives.
pub struct Runtime {
    pool: LocalPool,
    scheduler: Scheduler,
    fatal: oneshot::Receiver<SwitchError>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let pool = LocalPool::new();
        let host: Rc<dyn Host> = Rc::new(pool.spawner());
        let scheduler = Scheduler::new(host, config);
        let fatal = scheduler.fatal_signal();
        Runtime {
            pool,
            scheduler,
            fatal,
        }
    }

    /// The scheduler this runtime drives. Clone it to inspect state after `run`.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run `main` as continuation 0 until it completes or any continuation hits a
    /// fatal violation, whichever comes first.
    ///
    /// Continuations still suspended when `main` completes are dropped with the pool.
    pub fn run<F, Fut>(self, main: F) -> Result<(), SwitchError>
    where
        F: FnOnce(ContinuationHandle) -> Fut,
        Fut: Future<Output = Result<(), SwitchError>>,
    {
        let Runtime {
            mut pool,
            scheduler,
            fatal,
        } = self;
        let label = scheduler.config().label.clone();
        info!("[{}] running main continuation", label);

        let body = main(ContinuationHandle::new(
            ContinuationId::MAIN,
            scheduler.clone(),
        ));
        let outcome = pool.run_until(async move {
            futures::pin_mut!(body);
            match future::select(body, fatal).await {
                Either::Left((result, _)) => result,
                Either::Right((Ok(err), _)) => Err(err),
                // sender gone without a report: only main can end the run now
                Either::Right((Err(_), body)) => body.await,
            }
        });

        match &outcome {
            Ok(()) => info!(
                "[{}] main continuation finished after {} switches",
                label,
                scheduler.switch_count()
            ),
            Err(err) => debug!("[{}] run aborted: {}", label, err),
        }
        outcome
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
