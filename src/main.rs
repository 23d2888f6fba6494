use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::FutureExt;
use symswitch::{
    load_config, ContinuationHandle, ContinuationId, Runtime, SchedulerConfig, SwitchError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Demonstrate symmetric continuation switching", long_about = None)]
struct Cli {
    /// TOML file with a [scheduler] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every switch (overrides the config file)
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Two workers hand control back and forth, then return to main
    Greenlet,

    /// Main and one worker alternate for a number of rounds
    PingPong {
        #[arg(long, default_value_t = 3)]
        rounds: u32,
    },

    /// Deliberately break the switching protocol and report the violation
    Violation {
        #[arg(value_enum)]
        kind: ViolationKind,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ViolationKind {
    /// An entry action returns instead of switching away
    Returned,
    /// A suspended continuation tries to switch again
    Paused,
    /// Switch to a continuation that does not exist
    Missing,
}

/// Ids of both workers, filled in after both are spawned.
#[derive(Default)]
struct Pair {
    first: Cell<Option<ContinuationId>>,
    second: Cell<Option<ContinuationId>>,
}

fn peer(slot: &Cell<Option<ContinuationId>>) -> Result<ContinuationId, SwitchError> {
    slot.get()
        .ok_or_else(|| SwitchError::internal("peer continuation was not registered"))
}

async fn first_worker(handle: ContinuationHandle, pair: Rc<Pair>) -> Result<(), SwitchError> {
    let second = peer(&pair.second)?;
    println!("[{}] main  -> first", handle.id());
    handle.switch_to(second).await?;
    println!("[{}] first <- second", handle.id());
    handle.switch_to(second).await?;
    println!("[{}] first <- second, back to main", handle.id());
    loop {
        handle.switch_to(ContinuationId::MAIN).await?;
    }
}

async fn second_worker(handle: ContinuationHandle, pair: Rc<Pair>) -> Result<(), SwitchError> {
    let first = peer(&pair.first)?;
    println!("[{}] first -> second", handle.id());
    handle.switch_to(first).await?;
    println!("[{}] first -> second", handle.id());
    handle.switch_to(first).await?;
    // resumed a third time: returning reports EntrypointReturned
    Ok(())
}

async fn greenlet(handle: ContinuationHandle) -> Result<(), SwitchError> {
    let pair = Rc::new(Pair::default());
    let first = handle.spawn(first_worker, pair.clone());
    let second = handle.spawn(second_worker, pair.clone());
    pair.first.set(Some(first));
    pair.second.set(Some(second));

    handle.switch_to(first).await?;
    println!("[{}] main  <- first", handle.id());
    Ok(())
}

async fn echo(handle: ContinuationHandle, hits: Rc<RefCell<u32>>) -> Result<(), SwitchError> {
    loop {
        *hits.borrow_mut() += 1;
        println!("  pong from {}", handle.id());
        handle.switch_to(ContinuationId::MAIN).await?;
    }
}

fn ping_pong(runtime: Runtime, rounds: u32) -> Result<(), SwitchError> {
    let hits = Rc::new(RefCell::new(0u32));
    let counter = hits.clone();
    runtime.run(move |handle| async move {
        let worker = handle.spawn(echo, counter);
        for round in 1..=rounds {
            println!("ping {round} from {}", handle.id());
            handle.switch_to(worker).await?;
        }
        Ok::<(), SwitchError>(())
    })?;
    println!("{} rounds, worker ran {} times", rounds, hits.borrow());
    Ok(())
}

async fn return_immediately(_handle: ContinuationHandle, _payload: ()) -> Result<(), SwitchError> {
    Ok(())
}

async fn bounce(handle: ContinuationHandle, _payload: ()) -> Result<(), SwitchError> {
    loop {
        handle.switch_to(ContinuationId::MAIN).await?;
    }
}

fn violation(runtime: Runtime, kind: ViolationKind) -> Result<(), SwitchError> {
    runtime.run(move |handle| async move {
        match kind {
            ViolationKind::Returned => {
                let child = handle.spawn(return_immediately, ());
                handle.switch_to(child).await?;
            }
            ViolationKind::Paused => {
                let first = handle.spawn(bounce, ());
                let second = handle.spawn(bounce, ());
                // start the first switch without waiting for it to come back
                let pending = handle.switch_to(first).now_or_never();
                debug_assert!(pending.is_none());
                handle.switch_to(second).await?;
            }
            ViolationKind::Missing => {
                handle.switch_to(ContinuationId(u64::MAX)).await?;
            }
        }
        Ok::<(), SwitchError>(())
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(None)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let mut config: SchedulerConfig = load_config(cli.config.as_deref())
        .with_context(|| format!("loading config {:?}", cli.config))?;
    if cli.trace {
        config.trace_switches = true;
    }

    match cli.command {
        Commands::Greenlet => {
            Runtime::with_config(config).run(greenlet)?;
        }
        Commands::PingPong { rounds } => {
            ping_pong(Runtime::with_config(config), rounds)?;
        }
        Commands::Violation { kind } => match violation(Runtime::with_config(config), kind) {
            Ok(()) => anyhow::bail!("expected a {:?} violation, run finished cleanly", kind),
            Err(err) => println!("violation detected: {err}"),
        },
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
