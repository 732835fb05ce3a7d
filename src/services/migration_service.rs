use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::blockchain::address::{is_sapling_address, is_sprout_address};
use crate::blockchain::{allocate_addresses, NodeConnection, OperationId, Recipient};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::services::splitter::{AmountSplitter, DrawSource, RandomDraws};
use crate::store::{
    MigrationItem, MigrationProgress, MigrationStatus, Network, Plan, PlanStore,
};

/// Upper bound on parts a single plan may request
pub const MAX_PARTS: usize = 100;

/// Upper bound on the block window triggers are spread over
pub const MAX_BLOCK_WINDOW: u64 = 100_000;

/// Network and fee policy the engine runs under
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub network: Network,
    pub miner_fee: Decimal,
    pub min_amount: Decimal,
}

impl From<&AppConfig> for MigrationContext {
    fn from(config: &AppConfig) -> Self {
        Self {
            network: config.wallet.network,
            miner_fee: config.migration.miner_fee,
            min_amount: config.migration.min_amount,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// A previous tick is still waiting on its send
    Busy,
    Syncing,
    NoPlan,
    Complete,
    WaitingForBlock {
        trigger_block: u64,
        current_height: u64,
    },
    WaitingForConfirmations {
        address: String,
    },
    WaitingForIntermediateFunds {
        address: String,
    },
    SentToIntermediate {
        index: usize,
        operation_id: OperationId,
        amount: Decimal,
    },
    SentToDestination {
        index: usize,
        operation_id: OperationId,
        amount: Decimal,
    },
    InsufficientBalance {
        index: usize,
    },
}

/// Drives the persisted migration plan forward one step per tick.
///
/// No plan state is kept between ticks: every tick loads the plan, advances at
/// most one item and rewrites the whole plan.
pub struct MigrationScheduler {
    node: Arc<dyn NodeConnection>,
    store: PlanStore,
    context: MigrationContext,
    in_flight: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
}

impl MigrationScheduler {
    pub fn new(node: Arc<dyn NodeConnection>, store: PlanStore, context: MigrationContext) -> Self {
        Self {
            node,
            store,
            context,
            in_flight: tokio::sync::Mutex::new(()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    pub fn is_migration_present(&self) -> bool {
        !self.store.read(self.context.network).is_empty()
    }

    pub fn current_plan(&self) -> Plan {
        self.store.read(self.context.network)
    }

    pub fn progress(&self) -> Option<MigrationProgress> {
        progress_of(&self.store.read(self.context.network))
    }

    /// Drop the stored plan, waiting for any in-flight step first
    pub async fn clear(&self) -> AppResult<()> {
        let _guard = self.in_flight.lock().await;
        self.store.remove(self.context.network)?;
        tracing::info!("Removed {} migration plan", self.context.network);
        Ok(())
    }

    /// Split the balance at `source_address`, allocate one intermediate
    /// address per part and persist a fresh plan, replacing any existing one.
    pub async fn plan_migration(
        &self,
        source_address: &str,
        destination_address: &str,
        num_parts: usize,
        block_window: u64,
    ) -> AppResult<Plan> {
        let network = self.context.network;

        if !is_sprout_address(source_address, network) {
            return Err(AppError::ValidationError(format!(
                "{} is not a sprout address on {}",
                source_address, network
            )));
        }
        if !is_sapling_address(destination_address, network) {
            return Err(AppError::ValidationError(format!(
                "{} is not a sapling address on {}",
                destination_address, network
            )));
        }
        if num_parts == 0 || num_parts > MAX_PARTS {
            return Err(AppError::ValidationError(format!(
                "Number of parts must be between 1 and {}",
                MAX_PARTS
            )));
        }
        if block_window > MAX_BLOCK_WINDOW {
            return Err(AppError::ValidationError(format!(
                "Block window cannot exceed {} blocks",
                MAX_BLOCK_WINDOW
            )));
        }

        let balances = self.node.confirmed_balances().await?;
        let balance = balances
            .get(source_address)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let amounts = {
            let splitter = AmountSplitter::new(self.context.min_amount, self.context.miner_fee);
            let mut rng = self.lock_rng();
            splitter.split(balance, num_parts, &mut RandomDraws(&mut *rng))
        };

        if amounts.is_empty() {
            return Err(AppError::InsufficientBalance(
                "Could not initiate migration. You either have unconfirmed funds or the balance is too low for an automatic migration."
                    .to_string(),
            ));
        }

        let addresses = allocate_addresses(self.node.as_ref(), amounts.len()).await?;
        let height = self.node.block_height().await?;

        let trigger_blocks: Vec<u64> = {
            let mut rng = self.lock_rng();
            let mut draws = RandomDraws(&mut *rng);
            (0..amounts.len())
                .map(|_| height.saturating_add(draws.draw_below(block_window)))
                .collect()
        };

        let mut items: Vec<MigrationItem> = amounts
            .into_iter()
            .zip(addresses)
            .zip(trigger_blocks)
            .map(|((amount, intermediate_address), trigger_block)| MigrationItem {
                source_address: source_address.to_string(),
                intermediate_address,
                destination_address: destination_address.to_string(),
                amount,
                trigger_block,
                status: MigrationStatus::NotStarted,
            })
            .collect();

        // Start right away so the user sees progress
        if let Some(first) = items.first_mut() {
            first.trigger_block = height;
        }

        let plan = Plan::new(items);
        {
            let _guard = self.in_flight.lock().await;
            self.store.write(network, &plan)?;
        }

        tracing::info!(
            "Planned migration of {} from {} to {} in {} parts over blocks {}..{}",
            balance,
            source_address,
            destination_address,
            plan.len(),
            height,
            height.saturating_add(block_window)
        );

        match self.tick().await {
            Ok(outcome) => tracing::debug!("Initial migration tick: {:?}", outcome),
            Err(e) => tracing::warn!("Initial migration tick failed: {}", e),
        }

        Ok(self.store.read(network))
    }

    /// Advance the plan by at most one step. Ignored while a previous step
    /// is still in flight.
    pub async fn tick(&self) -> AppResult<TickOutcome> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Migration step already in flight, skipping tick");
                return Ok(TickOutcome::Busy);
            }
        };

        self.step().await
    }

    async fn step(&self) -> AppResult<TickOutcome> {
        // Wait for the node to catch up before trusting balances
        if self.node.is_syncing().await? {
            return Ok(TickOutcome::Syncing);
        }

        let mut plan = self.store.read(self.context.network);
        if plan.is_empty() {
            return Ok(TickOutcome::NoPlan);
        }

        let Some(index) = plan.next_pending() else {
            return Ok(TickOutcome::Complete);
        };
        let Some(item) = plan.get(index).cloned() else {
            return Err(AppError::InternalError(format!("No migration item at {}", index)));
        };

        let current_height = self.node.block_height().await?;
        if item.trigger_block > current_height {
            tracing::debug!(
                "Migration step {} waits for block {} (at {})",
                index,
                item.trigger_block,
                current_height
            );
            return Ok(TickOutcome::WaitingForBlock {
                trigger_block: item.trigger_block,
                current_height,
            });
        }

        match item.status {
            MigrationStatus::NotStarted => self.send_to_intermediate(&mut plan, index, &item).await,
            MigrationStatus::SentToIntermediate => {
                self.send_to_destination(&mut plan, index, &item).await
            }
            other => Err(AppError::InternalError(format!(
                "Item {} with status {:?} is not pending",
                index, other
            ))),
        }
    }

    async fn send_to_intermediate(
        &self,
        plan: &mut Plan,
        index: usize,
        item: &MigrationItem,
    ) -> AppResult<TickOutcome> {
        if let Some(address) = self.pending_spendable(&[&item.source_address]).await? {
            tracing::debug!("Unconfirmed funds at {}, waiting", address);
            return Ok(TickOutcome::WaitingForConfirmations { address });
        }

        let fee = self.context.miner_fee;
        let balance = self
            .node
            .confirmed_balances()
            .await?
            .get(&item.source_address)
            .copied()
            .unwrap_or(Decimal::ZERO);

        if item.amount > balance {
            tracing::warn!(
                "Migration step {}: {} holds {} but {} is planned",
                index,
                item.source_address,
                balance,
                item.amount
            );
            self.persist_status(plan, index, item, MigrationStatus::InsufficientBalance)?;
            return Ok(TickOutcome::InsufficientBalance { index });
        }

        // Sweep whatever is left on the last hop instead of leaving dust behind
        let mut amount = item.amount;
        if plan.is_last_pending(index) {
            let remaining = balance - fee;
            if remaining > Decimal::ZERO {
                amount = remaining;
            }
        }

        let operation_id = self
            .node
            .submit_send(
                &item.source_address,
                &[Recipient::new(item.intermediate_address.clone(), amount)],
                fee,
            )
            .await?;

        tracing::info!(
            "Migration step {}: sent {} from {} to {} ({})",
            index,
            amount,
            item.source_address,
            item.intermediate_address,
            operation_id
        );
        self.persist_status(plan, index, item, MigrationStatus::SentToIntermediate)?;

        Ok(TickOutcome::SentToIntermediate {
            index,
            operation_id,
            amount,
        })
    }

    async fn send_to_destination(
        &self,
        plan: &mut Plan,
        index: usize,
        item: &MigrationItem,
    ) -> AppResult<TickOutcome> {
        // Check both ends of the first hop
        if let Some(address) = self
            .pending_spendable(&[&item.intermediate_address, &item.source_address])
            .await?
        {
            tracing::debug!("Unconfirmed funds at {}, waiting", address);
            return Ok(TickOutcome::WaitingForConfirmations { address });
        }

        let balances = self.node.confirmed_balances().await?;
        let balance = match balances.get(&item.intermediate_address) {
            Some(balance) => *balance,
            None => {
                tracing::debug!(
                    "Intermediate address {} has no confirmed balance yet",
                    item.intermediate_address
                );
                return Ok(TickOutcome::WaitingForIntermediateFunds {
                    address: item.intermediate_address.clone(),
                });
            }
        };

        let fee = self.context.miner_fee;
        let amount = balance - fee;
        // Zero left after the fee is terminal too; a zero-value send is never submitted
        if amount <= Decimal::ZERO {
            tracing::warn!(
                "Migration step {}: {} holds {}, which leaves {} after the fee; zero or less is treated as insufficient",
                index,
                item.intermediate_address,
                balance,
                amount
            );
            self.persist_status(plan, index, item, MigrationStatus::InsufficientBalance)?;
            return Ok(TickOutcome::InsufficientBalance { index });
        }

        let operation_id = self
            .node
            .submit_send(
                &item.intermediate_address,
                &[Recipient::new(item.destination_address.clone(), amount)],
                fee,
            )
            .await?;

        tracing::info!(
            "Migration step {}: sent {} from {} to {} ({})",
            index,
            amount,
            item.intermediate_address,
            item.destination_address,
            operation_id
        );
        self.persist_status(plan, index, item, MigrationStatus::SentToDestination)?;

        Ok(TickOutcome::SentToDestination {
            index,
            operation_id,
            amount,
        })
    }

    /// First of `addresses` holding a spendable zero-confirmation output
    async fn pending_spendable(&self, addresses: &[&str]) -> AppResult<Option<String>> {
        let outputs = self.node.unspent_outputs().await?;
        Ok(addresses
            .iter()
            .find(|address| {
                outputs
                    .iter()
                    .any(|o| o.address == **address && o.is_pending_spendable())
            })
            .map(|address| address.to_string()))
    }

    fn persist_status(
        &self,
        plan: &mut Plan,
        index: usize,
        item: &MigrationItem,
        status: MigrationStatus,
    ) -> AppResult<()> {
        if !plan.replace(index, item.with_status(status)) {
            return Err(AppError::InternalError(format!(
                "Migration item {} vanished from the plan",
                index
            )));
        }

        self.store.write(self.context.network, plan).map_err(|e| {
            tracing::error!(
                "Migration step {} moved to {:?} but the plan could not be saved",
                index,
                status
            );
            AppError::from(e)
        })
    }

    /// A panic elsewhere cannot leave the generator in a bad state
    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Two steps per item; the current step is the first pending item's next hop
pub fn progress_of(plan: &Plan) -> Option<MigrationProgress> {
    let last = plan.items().last()?;

    let (step_index, next_trigger_block, current) = match plan.next_pending() {
        Some(index) => {
            let item = &plan.items()[index];
            let hop = usize::from(item.status == MigrationStatus::SentToIntermediate);
            (2 * index + hop, item.trigger_block, item)
        }
        None => (2 * plan.len(), 0, last),
    };

    Some(MigrationProgress {
        step_index,
        total_steps: 2 * plan.len(),
        next_trigger_block,
        has_errors: plan.has_errors(),
        source_address: current.source_address.clone(),
        destination_address: current.destination_address.clone(),
        intermediate_address: current.intermediate_address.clone(),
    })
}
