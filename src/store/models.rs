use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
}

impl Default for Network {
    fn default() -> Self {
        Network::Main
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Main => write!(f, "main"),
            Network::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    NotStarted,
    SentToIntermediate,
    SentToDestination,
    InsufficientBalance,
    /// Never assigned by the scheduler; kept so existing plan files still parse.
    UnknownError,
}

impl MigrationStatus {
    /// Still has a hop left to execute.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            MigrationStatus::NotStarted | MigrationStatus::SentToIntermediate
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MigrationStatus::InsufficientBalance | MigrationStatus::UnknownError
        )
    }
}

impl Default for MigrationStatus {
    fn default() -> Self {
        MigrationStatus::NotStarted
    }
}

/// One planned sprout -> transparent -> sapling hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationItem {
    pub source_address: String,
    pub intermediate_address: String,
    pub destination_address: String,
    pub amount: Decimal,
    pub trigger_block: u64,
    pub status: MigrationStatus,
}

impl MigrationItem {
    pub fn with_status(&self, status: MigrationStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Ordered migration plan, ascending by trigger block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    items: Vec<MigrationItem>,
}

impl Plan {
    pub fn new(mut items: Vec<MigrationItem>) -> Self {
        items.sort_by_key(|item| item.trigger_block);
        Self { items }
    }

    pub fn items(&self) -> &[MigrationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MigrationItem> {
        self.items.get(index)
    }

    /// Index of the first item that still has a hop left
    pub fn next_pending(&self) -> Option<usize> {
        self.items.iter().position(|item| item.status.is_pending())
    }

    /// True when no pending item follows `index`
    pub fn is_last_pending(&self, index: usize) -> bool {
        !self
            .items
            .iter()
            .skip(index + 1)
            .any(|item| item.status.is_pending())
    }

    pub fn is_complete(&self) -> bool {
        self.next_pending().is_none()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|item| item.status.is_error())
    }

    /// Replace the item at `index`. Ordering is by trigger block, which a status
    /// update never changes.
    pub fn replace(&mut self, index: usize, item: MigrationItem) -> bool {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }
}

/// Snapshot of where a migration stands, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationProgress {
    pub step_index: usize,
    pub total_steps: usize,
    pub next_trigger_block: u64,
    pub has_errors: bool,
    pub source_address: String,
    pub destination_address: String,
    pub intermediate_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(trigger_block: u64, status: MigrationStatus) -> MigrationItem {
        MigrationItem {
            source_address: "zcSource".to_string(),
            intermediate_address: format!("t1Int{}", trigger_block),
            destination_address: "zsDest".to_string(),
            amount: Decimal::new(5, 1),
            trigger_block,
            status,
        }
    }

    #[test]
    fn test_plan_sorts_by_trigger_block() {
        let plan = Plan::new(vec![
            item(30, MigrationStatus::NotStarted),
            item(10, MigrationStatus::NotStarted),
            item(20, MigrationStatus::NotStarted),
        ]);

        let blocks: Vec<u64> = plan.items().iter().map(|i| i.trigger_block).collect();
        assert_eq!(blocks, vec![10, 20, 30]);
    }

    #[test]
    fn test_next_pending_and_last_pending() {
        let plan = Plan::new(vec![
            item(10, MigrationStatus::SentToDestination),
            item(20, MigrationStatus::SentToIntermediate),
            item(30, MigrationStatus::InsufficientBalance),
        ]);

        assert_eq!(plan.next_pending(), Some(1));
        assert!(plan.is_last_pending(1));
        assert!(plan.has_errors());
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_replace_out_of_range() {
        let mut plan = Plan::new(vec![item(10, MigrationStatus::NotStarted)]);
        let updated = plan.items()[0].with_status(MigrationStatus::SentToIntermediate);

        assert!(!plan.replace(5, updated.clone()));
        assert!(plan.replace(0, updated));
        assert!(plan.is_last_pending(0));
        assert_eq!(plan.items()[0].status, MigrationStatus::SentToIntermediate);
    }
}
