use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::models::{MigrationItem, MigrationStatus, Network, Plan};

const PLAN_FILE_NAME: &str = "migration-plan.json";
const PLAN_FORMAT_VERSION: u32 = 1;
const ITEM_RECORD_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("plan file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported plan format version {0}")]
    UnsupportedVersion(u32),

    #[error("plan file declares {declared} items but holds {actual}")]
    CountMismatch { declared: usize, actual: usize },
}

/// On-disk layout of a plan. Decoupled from `Plan` so the format can evolve
/// without touching the in-memory model.
#[derive(Debug, Serialize, Deserialize)]
struct PlanFile {
    version: u32,
    network: Network,
    written_at: DateTime<Utc>,
    item_count: usize,
    items: Vec<ItemRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemRecord {
    version: u32,
    source_address: String,
    intermediate_address: String,
    destination_address: String,
    amount: Decimal,
    trigger_block: u64,
    status: MigrationStatus,
}

impl From<&MigrationItem> for ItemRecord {
    fn from(item: &MigrationItem) -> Self {
        ItemRecord {
            version: ITEM_RECORD_VERSION,
            source_address: item.source_address.clone(),
            intermediate_address: item.intermediate_address.clone(),
            destination_address: item.destination_address.clone(),
            amount: item.amount,
            trigger_block: item.trigger_block,
            status: item.status,
        }
    }
}

impl TryFrom<ItemRecord> for MigrationItem {
    type Error = StoreError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        if record.version != ITEM_RECORD_VERSION {
            return Err(StoreError::UnsupportedVersion(record.version));
        }

        Ok(MigrationItem {
            source_address: record.source_address,
            intermediate_address: record.intermediate_address,
            destination_address: record.destination_address,
            amount: record.amount,
            trigger_block: record.trigger_block,
            status: record.status,
        })
    }
}

/// File-backed store holding one migration plan per network.
///
/// There is no locking: callers must serialize access for a given network.
pub struct PlanStore {
    data_dir: PathBuf,
}

impl PlanStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn plan_path(&self, network: Network) -> PathBuf {
        match network {
            Network::Main => self.data_dir.join(PLAN_FILE_NAME),
            Network::Test => self.data_dir.join(format!("testnet-{}", PLAN_FILE_NAME)),
        }
    }

    /// Scratch file a new plan is written to before it replaces the old one
    pub(crate) fn staging_path(&self, network: Network) -> PathBuf {
        let mut path = self.plan_path(network).into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }

    /// Overwrite the plan for `network` wholesale. Readers see either the old
    /// plan or the new one, never a partial file.
    pub fn write(&self, network: Network, plan: &Plan) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;

        let items: Vec<ItemRecord> = plan.items().iter().map(ItemRecord::from).collect();
        let file = PlanFile {
            version: PLAN_FORMAT_VERSION,
            network,
            written_at: Utc::now(),
            item_count: items.len(),
            items,
        };

        let bytes = serde_json::to_vec_pretty(&file)?;
        let staging = self.staging_path(network);
        fs::write(&staging, bytes)?;
        fs::rename(&staging, self.plan_path(network))?;

        tracing::debug!("Wrote {} plan with {} items", network, plan.len());
        Ok(())
    }

    /// Load the plan, sorted by trigger block. A missing file is an empty plan.
    pub fn load(&self, network: Network) -> Result<Plan, StoreError> {
        let bytes = match fs::read(self.plan_path(network)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Plan::default()),
            Err(e) => return Err(e.into()),
        };

        let file: PlanFile = serde_json::from_slice(&bytes)?;
        if file.version != PLAN_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(file.version));
        }
        if file.item_count != file.items.len() {
            return Err(StoreError::CountMismatch {
                declared: file.item_count,
                actual: file.items.len(),
            });
        }

        let items = file
            .items
            .into_iter()
            .map(MigrationItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plan::new(items))
    }

    /// Like `load`, but an unreadable or corrupt file reads as "no plan"
    pub fn read(&self, network: Network) -> Plan {
        match self.load(network) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable {} migration plan at {}: {}",
                    network,
                    self.plan_path(network).display(),
                    e
                );
                Plan::default()
            }
        }
    }

    pub fn remove(&self, network: Network) -> Result<(), StoreError> {
        match fs::remove_file(self.plan_path(network)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(intermediate: &str, trigger_block: u64, status: MigrationStatus) -> MigrationItem {
        MigrationItem {
            source_address: "zcSproutSource".to_string(),
            intermediate_address: intermediate.to_string(),
            destination_address: "zsSaplingDest".to_string(),
            amount: Decimal::new(12345678, 8),
            trigger_block,
            status,
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_plan() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        let original = Plan::new(vec![item("t1A", 100, MigrationStatus::NotStarted)]);
        store.write(Network::Main, &original).unwrap();

        // A directory in the staging slot makes the write fail
        fs::create_dir(store.staging_path(Network::Main)).unwrap();
        let updated = Plan::new(vec![item("t1A", 100, MigrationStatus::SentToIntermediate)]);

        assert!(matches!(
            store.write(Network::Main, &updated),
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.load(Network::Main).unwrap(), original);
    }

    #[test]
    fn test_write_then_read_returns_sorted_plan() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());

        let plan = Plan::new(vec![
            item("t1B", 120, MigrationStatus::SentToIntermediate),
            item("t1A", 100, MigrationStatus::NotStarted),
            item("t1C", 150, MigrationStatus::InsufficientBalance),
        ]);
        store.write(Network::Main, &plan).unwrap();

        let loaded = store.read(Network::Main);
        assert_eq!(loaded, plan);
        assert_eq!(loaded.items()[0].intermediate_address, "t1A");
        assert_eq!(loaded.items()[0].amount, Decimal::new(12345678, 8));
    }

    #[test]
    fn test_read_sorts_unsorted_file() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());

        let raw = serde_json::json!({
            "version": 1,
            "network": "main",
            "written_at": "2024-01-01T00:00:00Z",
            "item_count": 2,
            "items": [
                {
                    "version": 1,
                    "source_address": "zcA",
                    "intermediate_address": "t1Late",
                    "destination_address": "zsB",
                    "amount": "0.5",
                    "trigger_block": 900,
                    "status": "not_started"
                },
                {
                    "version": 1,
                    "source_address": "zcA",
                    "intermediate_address": "t1Early",
                    "destination_address": "zsB",
                    "amount": "0.25",
                    "trigger_block": 800,
                    "status": "sent_to_intermediate"
                }
            ]
        });
        fs::write(store.plan_path(Network::Main), raw.to_string()).unwrap();

        let plan = store.load(Network::Main).unwrap();
        assert_eq!(plan.items()[0].intermediate_address, "t1Early");
        assert_eq!(plan.items()[1].trigger_block, 900);
    }

    #[test]
    fn test_missing_file_is_empty_plan() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path().join("not-created-yet"));

        assert!(store.load(Network::Test).unwrap().is_empty());
        assert!(store.read(Network::Test).is_empty());
    }

    #[test]
    fn test_malformed_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        fs::write(store.plan_path(Network::Main), b"{\"version\": 1, \"items\": [").unwrap();

        assert!(matches!(store.load(Network::Main), Err(StoreError::Malformed(_))));
        assert!(store.read(Network::Main).is_empty());
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        let raw = serde_json::json!({
            "version": 1,
            "network": "main",
            "written_at": "2024-01-01T00:00:00Z",
            "item_count": 3,
            "items": []
        });
        fs::write(store.plan_path(Network::Main), raw.to_string()).unwrap();

        assert!(matches!(
            store.load(Network::Main),
            Err(StoreError::CountMismatch { declared: 3, actual: 0 })
        ));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        let raw = serde_json::json!({
            "version": 7,
            "network": "main",
            "written_at": "2024-01-01T00:00:00Z",
            "item_count": 0,
            "items": []
        });
        fs::write(store.plan_path(Network::Main), raw.to_string()).unwrap();

        assert!(matches!(
            store.load(Network::Main),
            Err(StoreError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_networks_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        let plan = Plan::new(vec![item("tmTest", 10, MigrationStatus::NotStarted)]);

        store.write(Network::Test, &plan).unwrap();

        assert!(store.read(Network::Main).is_empty());
        assert_eq!(store.read(Network::Test).len(), 1);
        assert!(store
            .plan_path(Network::Test)
            .to_string_lossy()
            .ends_with("testnet-migration-plan.json"));
    }

    #[test]
    fn test_write_overwrites_previous_plan() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());

        store
            .write(
                Network::Main,
                &Plan::new(vec![
                    item("t1Old1", 1, MigrationStatus::NotStarted),
                    item("t1Old2", 2, MigrationStatus::NotStarted),
                ]),
            )
            .unwrap();
        store
            .write(
                Network::Main,
                &Plan::new(vec![item("t1New", 5, MigrationStatus::NotStarted)]),
            )
            .unwrap();

        let plan = store.read(Network::Main);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.items()[0].intermediate_address, "t1New");
    }

    #[test]
    fn test_remove_clears_plan_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let store = PlanStore::new(dir.path());
        store
            .write(
                Network::Main,
                &Plan::new(vec![item("t1A", 1, MigrationStatus::SentToDestination)]),
            )
            .unwrap();

        store.remove(Network::Main).unwrap();
        assert!(store.read(Network::Main).is_empty());
        store.remove(Network::Main).unwrap();
    }
}
