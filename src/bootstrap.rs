use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::WatcherConfig;
use crate::discovery::Discovery;
use crate::error::{WatcherError, WatcherResult};
use crate::fetcher::StateFetcher;
use crate::ledger::models::mist_to_sui;
use crate::ledger::signer::WatcherSigner;
use crate::ledger::sui::{SuiRpcClient, SuiRpcConfig};
use crate::ledger::LedgerClient;
use crate::settlement::SettlementExecutor;
use crate::sweep::{StatusBoard, SweepDriver};

/// Shared pieces every command needs
pub struct WatcherComponents {
    pub config: Arc<WatcherConfig>,
    pub ledger: Arc<dyn LedgerClient>,
    pub signer: Arc<WatcherSigner>,
    pub status: Arc<StatusBoard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceCheck {
    Sufficient(u128),
    /// Below one settlement's gas budget
    Low(u128),
    Unknown,
}

pub fn initialize(config: WatcherConfig) -> WatcherResult<WatcherComponents> {
    info!("Initializing watcher components ...");

    let signer = WatcherSigner::from_encoded(config.signing_credential.expose())
        .map_err(|e| WatcherError::Config(format!("BOT_PRIVATE_KEY is not a valid key: {}", e)))?;
    info!("🔑 Watcher address: {}", signer.address());

    let ledger = SuiRpcClient::new(SuiRpcConfig {
        rpc_url: config.rpc_url.clone(),
        event_id_field: config.event_id_field.clone(),
        request_timeout: config.submission_timeout,
    })?;
    info!("✅ Sui RPC client initialized for {}", config.rpc_url);

    Ok(with_ledger(config, Arc::new(ledger), Arc::new(signer)))
}

pub fn with_ledger(
    config: WatcherConfig,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<WatcherSigner>,
) -> WatcherComponents {
    let status = Arc::new(StatusBoard::new(signer.address()));
    WatcherComponents {
        config: Arc::new(config),
        ledger,
        signer,
        status,
    }
}

impl WatcherComponents {
    pub fn discovery(&self) -> Discovery {
        Discovery::new(self.ledger.clone(), self.config.clone())
    }

    pub fn fetcher(&self) -> StateFetcher {
        StateFetcher::new(self.ledger.clone(), self.config.clone())
    }

    pub fn driver(&self, dry_run: bool) -> SweepDriver {
        let executor = SettlementExecutor::new(
            self.ledger.clone(),
            self.signer.clone(),
            self.config.clone(),
        );

        SweepDriver::new(
            self.config.clone(),
            self.discovery(),
            self.fetcher(),
            executor,
            self.status.clone(),
        )
        .with_dry_run(dry_run)
    }

    /// Log the watcher's gas balance. Never fatal.
    pub async fn preflight_balance(&self) -> BalanceCheck {
        let address = self.signer.address();
        let call = self.ledger.get_balance(address);

        let balance = match tokio::time::timeout(self.config.rpc_timeout, call).await {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                error!("❌ Failed to read balance of {}: {}", address, e);
                return BalanceCheck::Unknown;
            }
            Err(_) => {
                error!("❌ Balance lookup for {} timed out", address);
                return BalanceCheck::Unknown;
            }
        };

        info!("💰 Watcher balance: {} SUI", mist_to_sui(balance));

        if balance < u128::from(self.config.max_gas_budget) {
            warn!(
                "⚠️  Balance below one settlement gas budget ({} SUI); submissions will fail until funded",
                mist_to_sui(u128::from(self.config.max_gas_budget))
            );
            BalanceCheck::Low(balance)
        } else {
            BalanceCheck::Sufficient(balance)
        }
    }
}
