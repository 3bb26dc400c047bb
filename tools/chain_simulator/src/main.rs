use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chain_simulator::{Simulation, SimulationConfig, WithholdingEscrow};
use swap_coordinator::clock::{Clock, ManualClock, SystemClock};
use swap_coordinator::config::{InitiatorConfig, PricingConfig, ResponderConfig, BASE_UNIT};
use swap_coordinator::initiator::{AutoApprove, LimitApproval, OfferApproval};
use swap_coordinator::retry::RetryConfig;
use swap_coordinator::SwapOutcome;

#[derive(Parser)]
#[command(name = "swap-sim", version, about = "Run atomic swaps against in-memory chains")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one swap to completion
    Demo(SimArgs),
    /// Let the initiator vanish after funding and watch the responder refund
    Stall(SimArgs),
}

#[derive(Args)]
struct SimArgs {
    /// Ledger-A amount in whole coins
    #[arg(long, default_value_t = 500)]
    amount: u128,
    /// Highest Ledger-B total the initiator approves
    #[arg(long)]
    max_cost: Option<u128>,
    /// Time between blocks on both chains
    #[arg(long, default_value_t = 200)]
    block_interval_ms: u64,
    /// Give up after this many seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
    /// Log responder transactions instead of broadcasting them
    #[arg(long)]
    dry_run: bool,
    /// Journal responder sessions as JSON files in this directory
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

impl SimArgs {
    fn config(&self) -> SimulationConfig {
        let mut initiator = InitiatorConfig::from_env();
        initiator.poll_interval = Duration::from_millis(self.block_interval_ms);
        SimulationConfig {
            responder: ResponderConfig::from_env(),
            initiator,
            pricing: PricingConfig::from_env(),
            retry: RetryConfig::from_env(),
            dry_run: self.dry_run,
            state_dir: self.state_dir.clone(),
            ..SimulationConfig::default()
        }
    }

    fn amount(&self) -> Result<u128> {
        self.amount
            .checked_mul(BASE_UNIT)
            .ok_or_else(|| anyhow!("amount {} overflows", self.amount))
    }

    fn approval(&self) -> Arc<dyn OfferApproval> {
        match self.max_cost {
            Some(max_total_cost) => Arc::new(LimitApproval { max_total_cost }),
            None => Arc::new(AutoApprove),
        }
    }

    fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo(args) => run_demo(args).await,
        Command::Stall(args) => run_stall(args).await,
    }
}

/// Flips `shutdown` once `timeout` elapses.
fn arm_timeout(
    timeout: Duration,
    shutdown: Arc<watch::Sender<bool>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(?timeout, "Timed out, shutting down");
        let _ = shutdown.send(true);
    })
}

async fn run_demo(args: SimArgs) -> Result<()> {
    let amount = args.amount()?;
    let sim = Simulation::new(args.config(), Arc::new(SystemClock))?;
    sim.service.recover().await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let mut tasks = sim.spawn_miners(args.block_interval(), shutdown_rx.clone());
    tasks.extend(sim.service.clone().start(shutdown_rx.clone()));
    let timer = arm_timeout(Duration::from_secs(args.timeout_secs), shutdown_tx.clone());

    let flow = sim.initiator(args.approval(), shutdown_rx.clone());
    let outcome = flow.perform_swap(amount, &[sim.transport()]).await;

    timer.abort();
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(anti_spam_id) = err.reclaimable_deposit() {
                warn!(anti_spam_id, "Escrow deposit left behind; reclaim it after the escrow delay");
            }
            return Err(err.into());
        }
    };
    match outcome {
        SwapOutcome::Completed(completed) => {
            println!("{}", serde_json::to_string_pretty(&completed)?);
        }
        SwapOutcome::Declined { reason } => {
            println!("declined: {reason}");
        }
    }
    println!("initiator Ledger-A balance: {}", sim.initiator_utxo.balance());
    println!("responder Ledger-A balance: {}", sim.responder_utxo.balance());
    println!("responder Ledger-B balance: {}", sim.responder_escrow.balance());
    println!("initiator Ledger-B balance: {}", sim.initiator_escrow.balance());
    Ok(())
}

async fn run_stall(args: SimArgs) -> Result<()> {
    let amount = args.amount()?;
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let config = args.config();
    let lifetime = config.responder.session_lifetime_secs();
    let sim = Simulation::new(config, clock.clone())?;
    sim.service.recover().await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let tasks = sim.spawn_miners(args.block_interval(), shutdown_rx.clone());
    let timer = arm_timeout(Duration::from_secs(args.timeout_secs), shutdown_tx.clone());
    let withholding = Arc::new(WithholdingEscrow::new(sim.initiator_escrow.clone()));
    let flow = sim.initiator_with(withholding, args.approval(), shutdown_rx.clone());

    match flow.perform_swap(amount, &[sim.transport()]).await {
        Ok(outcome) => bail!("initiator was expected to stall, got {outcome:?}"),
        Err(err) => warn!(error = %err, "Initiator stalled"),
    }

    clock.advance(lifetime + 1);
    info!("Session deadline passed");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.timeout_secs);
    let refund_tx_id = loop {
        let report = sim.service.check_all(clock.now()).await;
        if let Some((swap_id, tx_id)) = report.refunded.first() {
            info!(%swap_id, %tx_id, "Refund broadcast");
            break *tx_id;
        }
        for (swap_id, err) in &report.failed {
            info!(%swap_id, error = %err, "Refund not accepted yet");
        }
        if tokio::time::Instant::now() > deadline {
            bail!("no refund within {}s", args.timeout_secs);
        }
        tokio::time::sleep(args.block_interval()).await;
    };

    while !args.dry_run && !sim.utxo.is_included(&refund_tx_id) {
        if tokio::time::Instant::now() > deadline {
            bail!("refund {refund_tx_id} not mined within {}s", args.timeout_secs);
        }
        tokio::time::sleep(args.block_interval()).await;
    }
    timer.abort();
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    println!("refund transaction: {refund_tx_id}");
    println!("responder Ledger-A balance: {}", sim.responder_utxo.balance());
    println!("initiator Ledger-B balance: {}", sim.initiator_escrow.balance());
    Ok(())
}
