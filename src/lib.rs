//! symswitch: symmetric continuation switching on a single-threaded async executor.
//!
//! # Architecture
//!
//! - **Continuation table**: one optional resume action per continuation id
//! - **Switch coordinator**: `spawn` registers unborn continuations, `switch_to` hands
//!   control to a named continuation and parks the caller on a one-shot wake signal
//! - **Runtime**: a `LocalPool` that drives every continuation body and runs the main
//!   entry as continuation 0
//!
//! There is no ready queue. Exactly one continuation is current; every other one is
//! suspended inside `switch_to`, unborn, or detached after a fatal violation.
//!
//! ```no_run
//! use symswitch::{ContinuationHandle, ContinuationId, Runtime, SwitchError};
//!
//! async fn worker(handle: ContinuationHandle, rounds: u32) -> Result<(), SwitchError> {
//!     for _ in 0..rounds {
//!         handle.switch_to(ContinuationId::MAIN).await?;
//!     }
//!     loop {
//!         handle.switch_to(ContinuationId::MAIN).await?;
//!     }
//! }
//!
//! async fn main_body(handle: ContinuationHandle) -> Result<(), SwitchError> {
//!     let worker = handle.spawn(worker, 3);
//!     for _ in 0..3 {
//!         handle.switch_to(worker).await?;
//!     }
//!     Ok(())
//! }
//!
//! Runtime::new().run(main_body).unwrap();
//! ```

pub mod config;
pub mod continuation;
pub mod error;
pub mod ids;
pub mod runtime;
pub mod scheduler;
pub mod table;

pub use config::{load_config, parse_config, ConfigError, SchedulerConfig};
pub use continuation::ContinuationHandle;
pub use error::SwitchError;
pub use ids::ContinuationId;
pub use runtime::{Host, Runtime};
pub use scheduler::{ContinuationState, EntryFuture, EntryThunk, ResumeAction, Scheduler};
pub use table::{ContinuationRecord, ContinuationTable};
