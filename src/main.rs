//! Cupchain Mining Client - Main Application
//!
//! Drives the mining loop: refresh the chain cache, fetch the tip, build a
//! template, search for nonces in parallel, submit what was found, keep the
//! balance ledger current, report throughput, pause, repeat.

use cupchain_mining_client::{
    client::{AuthorityClient, HttpLedgerMirror},
    config::Config,
    ledger::BalanceLedger,
    miner::MiningCoordinator,
    stats::HashRateReporter,
    submit::{LogBroadcaster, SubmissionClient, SubmitOutcome},
    sync::ChainSynchronizer,
    types::{Address, BlockTemplate, Difficulty, MinedBlock, Transaction},
    Result, APP_NAME, APP_VERSION,
};

use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// The assembled mining application
struct MinerApp {
    config: Config,
    miner_address: Address,
    difficulty: Difficulty,
    coordinator: MiningCoordinator,
    synchronizer: ChainSynchronizer,
    submission: SubmissionClient,
    reporter: HashRateReporter,
    authority: Arc<AuthorityClient>,
    ledger: BalanceLedger,
    mirror: Option<HttpLedgerMirror>,
    /// Transactions queued for the next block. Fed by the node's gossip
    /// layer, which is wired in externally; drained every round.
    pending: Vec<Transaction>,
}

impl MinerApp {
    /// Assemble all components from the process configuration
    fn new(config: Config) -> Result<Self> {
        let miner_address = config.miner_address()?;
        let difficulty = config.difficulty()?;
        let authority = Arc::new(AuthorityClient::new(&config)?);

        let coordinator = MiningCoordinator::new(config.worker_count());
        let synchronizer =
            ChainSynchronizer::new(Arc::clone(&authority), config.chain_cache_file());
        let submission = SubmissionClient::new(
            Arc::clone(&authority),
            Arc::new(LogBroadcaster),
            config.dedup_window_duration(),
            config.dedup_capacity,
        );
        let reporter = HashRateReporter::new(Arc::clone(&authority), miner_address.clone());

        let mut ledger = BalanceLedger::new(&config.ledger_file, config.reward_address());
        ledger.load()?;

        let mirror = match &config.mirror_url {
            Some(url) => Some(HttpLedgerMirror::new(url, config.http_timeout_duration())?),
            None => None,
        };

        Ok(Self {
            config,
            miner_address,
            difficulty,
            coordinator,
            synchronizer,
            submission,
            reporter,
            authority,
            ledger,
            mirror,
            pending: Vec::new(),
        })
    }

    /// Run mining rounds until shutdown is requested.
    ///
    /// Shutdown never interrupts a round in flight; it only prevents the
    /// next one from starting.
    async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            miner = %self.miner_address,
            difficulty = %self.difficulty,
            interval_ms = self.config.mining_interval,
            workers = self.coordinator.worker_count(),
            authority = %self.config.authority_url(),
            metrics = %self.config.metrics_url(),
            "Miner starting"
        );

        while !shutdown.is_cancelled() {
            if let Err(e) = self.round().await {
                error!(category = e.category(), error = %e, "Mining round failed");
            }

            tokio::select! {
                _ = sleep(self.config.mining_interval_duration()) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        info!(miner = %self.miner_address, "Miner stopped");
        Ok(())
    }

    /// One full mining round
    async fn round(&mut self) -> Result<()> {
        // Best-effort: mine on with cached state if the sync fails
        if let Err(e) = self.synchronizer.sync().await {
            warn!(error = %e, "Chain sync failed, continuing with cached state");
        }

        let tip = self.authority.get_latest_block().await?;
        let transactions = std::mem::take(&mut self.pending);
        let template = BlockTemplate::next(&tip, transactions, self.difficulty);
        info!(index = template.index, txs = template.transactions.len(), "Mining new block");

        let round = self.coordinator.run_round(template).await?;

        for block in &round.blocks {
            if self.submission.submit(block).await? == SubmitOutcome::Accepted {
                self.apply_accepted_block(block).await;
            }
        }

        // Telemetry is best-effort, never escalated
        if let Err(e) = self.reporter.report(&round).await {
            warn!(error = %e, "Hash rate report failed");
        }

        Ok(())
    }

    /// Fold an accepted block's transactions into the local ledger
    async fn apply_accepted_block(&mut self, block: &MinedBlock) {
        let applied = self.ledger.apply_block(block);
        if applied > 0 {
            info!(hash = %block.hash, applied, "Ledger updated from accepted block");
        }

        if let Err(e) = self.ledger.save() {
            warn!(error = %e, "Ledger snapshot save failed");
        }

        if let Some(mirror) = &self.mirror {
            let flushed = self.ledger.flush_outbox(mirror).await;
            if self.ledger.pending_mirrors() > 0 {
                warn!(
                    flushed,
                    pending = self.ledger.pending_mirrors(),
                    "Mirror outbox not fully drained"
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration before anything logs
    let config = Config::load().await?;

    let level = tracing::Level::from(config.log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing the current round");
            signal_token.cancel();
        }
    });

    let mut app = MinerApp::new(config).map_err(|e| {
        error!(error = %e, "Failed to start miner");
        e
    })?;
    app.run(shutdown).await
}

/// Print current configuration as YAML
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}
