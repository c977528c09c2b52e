//! In-memory grid backend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::grid::processor::{EntryProcessor, GridBucketState, InvocationResult};
use crate::grid::{GridBackend, GridError};

/// A process-local [`GridBackend`] with per-entry atomicity provided by
/// `DashMap`'s shard locking.
///
/// Useful for tests and for embedding the remote code path without a real
/// cluster; the entry processor protocol is identical either way.
#[derive(Debug, Default)]
pub struct InMemoryGrid {
    entries: DashMap<String, GridBucketState>,
}

impl InMemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the entry at `key`, for inspection.
    pub fn get(&self, key: &str) -> Option<GridBucketState> {
        self.entries.get(key).map(|entry| entry.clone())
    }
}

impl GridBackend for InMemoryGrid {
    fn invoke(&self, key: &str, processor: &EntryProcessor) -> Result<InvocationResult, GridError> {
        // The entry guard holds the shard lock for the whole
        // read-modify-write, which is exactly the atomicity the contract
        // requires.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (next, result) = processor.execute(Some(occupied.get().clone()));
                match next {
                    Some(state) => {
                        occupied.insert(state);
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(result)
            }
            Entry::Vacant(vacant) => {
                let (next, result) = processor.execute(None);
                if let Some(state) = next {
                    vacant.insert(state);
                }
                Ok(result)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<bool, GridError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::grid::processor::{CommandOutcome, EntryCommand};
    use crate::limits::{Bandwidth, LimitsConfig};

    fn config() -> LimitsConfig {
        LimitsConfig::single(Bandwidth::simple(10, Duration::from_secs(10)).unwrap())
    }

    #[test]
    fn test_invoke_creates_entry_when_config_carried() {
        let grid = InMemoryGrid::new();
        let processor =
            EntryProcessor::with_config(EntryCommand::TryConsume { tokens: 1 }, 0, config());

        let result = grid.invoke("api:alice", &processor).unwrap();
        assert_eq!(result, InvocationResult::Outcome(CommandOutcome::Consumed(true)));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.get("api:alice").unwrap().state.available_tokens(), 9);
    }

    #[test]
    fn test_invoke_missing_writes_nothing() {
        let grid = InMemoryGrid::new();
        let processor = EntryProcessor::new(EntryCommand::TryConsume { tokens: 1 }, 0);

        let result = grid.invoke("api:alice", &processor).unwrap();
        assert_eq!(result, InvocationResult::Missing);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_remove_reports_existence() {
        let grid = InMemoryGrid::new();
        let processor =
            EntryProcessor::with_config(EntryCommand::TryConsume { tokens: 1 }, 0, config());
        grid.invoke("api:alice", &processor).unwrap();

        assert!(grid.remove("api:alice").unwrap());
        assert!(!grid.remove("api:alice").unwrap());
        assert!(grid.is_empty());
    }

    #[test]
    fn test_concurrent_invocations_never_overdraw() {
        let grid = std::sync::Arc::new(InMemoryGrid::new());
        let seed =
            EntryProcessor::with_config(EntryCommand::GetAvailableTokens, 0, config());
        grid.invoke("shared", &seed).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let grid = grid.clone();
            handles.push(std::thread::spawn(move || {
                let mut consumed = 0i64;
                for _ in 0..10 {
                    let processor =
                        EntryProcessor::new(EntryCommand::TryConsume { tokens: 1 }, 0);
                    if let InvocationResult::Outcome(CommandOutcome::Consumed(true)) =
                        grid.invoke("shared", &processor).unwrap()
                    {
                        consumed += 1;
                    }
                }
                consumed
            }));
        }

        let total: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10);
    }
}
