//! Seeded registration simulator.
//!
//! Drives a registration manager through a random but reproducible sequence
//! of stack events against a scripted registrar, checking every invariant
//! after each step.
//!
//! # Usage
//!
//! ```bash
//! # 500 random steps on a router
//! meshreg-sim --seed 7
//!
//! # Sleepy end device, verbose
//! meshreg-sim --role end-device --steps 2000 --log-level debug
//! ```

use std::{process::ExitCode, time::Duration};

use arbitrary::{Arbitrary, Unstructured};
use clap::{Parser, ValueEnum};
use meshreg_core::{ConfigError, DuaConfig, DuaState};
use meshreg_harness::{Operation, SimEnv, SimHost, World};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Bytes of entropy handed to each generated operation.
const OPERATION_ENTROPY: usize = 16;

/// Domain unicast address registration simulator
#[derive(Parser, Debug)]
#[command(name = "meshreg-sim")]
#[command(version)]
struct Args {
    /// Seed for the environment and the operation stream
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of random operations to apply
    #[arg(long, default_value = "500")]
    steps: usize,

    /// Simulated device
    #[arg(long, value_enum, default_value = "router")]
    role: DeviceRole,

    /// Ticks before registering a newly added address
    #[arg(long, default_value = "1")]
    new_dua_delay: u8,

    /// Ticks before registering after becoming a router
    #[arg(long, default_value = "3")]
    new_router_delay: u8,

    /// Retry delay after a send ran out of buffers
    #[arg(long, default_value = "5")]
    no_buf_delay: u8,

    /// Retry delay after a response timeout
    #[arg(long, default_value = "30")]
    response_timeout_delay: u8,

    /// Upper bound of the check delay after a child update
    #[arg(long, default_value = "5")]
    parent_aggregate_delay: u8,

    /// Seconds before a registered address becomes preferred
    #[arg(long, default_value = "100")]
    dad_period: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceRole {
    /// Full-function router proxying for its children
    Router,
    /// Sleepy end device behind a legacy parent
    EndDevice,
}

#[derive(Debug, Error)]
enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invariant violated at step {step} ({operation:?}): {detail}")]
    Invariant { step: usize, operation: Operation, detail: String },
}

/// What a finished run looked like.
#[derive(Debug)]
struct Summary {
    requests: usize,
    notifications: usize,
    aborts: usize,
    state: DuaState,
    dad_counter: u8,
    proxied: usize,
    registered: usize,
    elapsed: Duration,
}

impl Args {
    fn config(&self) -> DuaConfig {
        DuaConfig {
            new_dua_registration_delay: self.new_dua_delay,
            new_router_registration_delay: self.new_router_delay,
            no_buf_delay: self.no_buf_delay,
            response_timeout_delay: self.response_timeout_delay,
            parent_aggregate_delay: self.parent_aggregate_delay,
            dad_period: Duration::from_secs(self.dad_period),
            proxy_enabled: self.role == DeviceRole::Router,
        }
    }
}

fn run(args: &Args) -> Result<Summary, SimError> {
    let env = SimEnv::with_seed(args.seed);
    let host = match args.role {
        DeviceRole::Router => SimHost::router(env.clone()),
        DeviceRole::EndDevice => SimHost::sleepy_end_device(env.clone()),
    };
    let mut world = World::with_host(args.config(), host, env)?;

    // Separate stream so operations do not perturb the environment's RNG.
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed.rotate_left(32));
    let mut entropy = [0u8; OPERATION_ENTROPY];

    for step in 0..args.steps {
        rng.fill_bytes(&mut entropy);
        let Ok(operation) = Operation::arbitrary(&mut Unstructured::new(&entropy)) else {
            continue;
        };

        debug!(step, ?operation, "applying");
        world.apply(&operation);

        world
            .check_invariants()
            .map_err(|detail| SimError::Invariant { step, operation, detail })?;
    }

    let proxy = world.manager.proxy();
    Ok(Summary {
        requests: world.host.sent().len(),
        notifications: world.host.notifications().len(),
        aborts: world.host.aborts(),
        state: world.manager.state(),
        dad_counter: world.manager.dad_counter(),
        proxied: proxy.proxy_mask().len(),
        registered: proxy.registered_mask().len(),
        elapsed: world.env().elapsed(),
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!(seed = args.seed, steps = args.steps, role = ?args.role, "starting simulation");

    match run(&args) {
        Ok(summary) => {
            info!(
                requests = summary.requests,
                notifications = summary.notifications,
                aborts = summary.aborts,
                state = %summary.state,
                dad_counter = summary.dad_counter,
                proxied = summary.proxied,
                registered = summary.registered,
                elapsed_secs = summary.elapsed.as_secs(),
                "simulation finished"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %e, seed = args.seed, "simulation failed");
            ExitCode::FAILURE
        },
    }
}
