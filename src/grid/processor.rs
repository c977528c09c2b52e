//! Entry processors: named opcodes applied atomically to grid entries.
//!
//! Nothing executable crosses the process boundary. A processor is an
//! opcode plus its payload; the executing side dispatches on the opcode
//! and runs the same state machine the local bucket uses.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bucket::algorithm::{self, Reservation};
use crate::bucket::state::BucketState;
use crate::limits::LimitsConfig;

/// A bucket state together with the rules that govern it.
///
/// The configuration travels with the state because the remote executor is
/// stateless: the entry alone must carry everything needed to apply an
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridBucketState {
    pub config: LimitsConfig,
    pub state: BucketState,
}

impl GridBucketState {
    /// Seed a fresh entry from a configuration.
    pub fn initial(config: LimitsConfig, now_nanos: u64) -> Self {
        let state = BucketState::initial(&config, now_nanos);
        Self { config, state }
    }
}

/// The operation to run against an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryCommand {
    TryConsume { tokens: i64 },
    ConsumeAsMuchAsPossible { limit: i64 },
    Reserve { tokens: i64, max_wait_nanos: u64 },
    AddTokens { tokens: i64 },
    GetAvailableTokens,
    ReplaceConfiguration { config: LimitsConfig },
}

/// An opcode plus everything the executor needs: the caller's clock
/// reading and, on the reconstruction retry, the configuration to seed a
/// missing entry with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryProcessor {
    pub command: EntryCommand,
    pub now_nanos: u64,
    pub config: Option<LimitsConfig>,
}

/// Result of one command against one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// `TryConsume`: whether the tokens were debited.
    Consumed(bool),
    /// `ConsumeAsMuchAsPossible`: the amount actually debited.
    ConsumedAmount(i64),
    /// `Reserve`: the nanoseconds to wait, or `None` when rejected.
    Wait(Option<u64>),
    /// `GetAvailableTokens`: the post-refill minimum across bandwidths.
    Available(i64),
    /// `ReplaceConfiguration` could not map ids unambiguously.
    Conflict(String),
    /// `AddTokens` / `ReplaceConfiguration` applied.
    Done,
}

/// What the grid hands back from an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvocationResult {
    /// The command ran against a (possibly freshly reconstructed) entry.
    Outcome(CommandOutcome),
    /// The entry was absent and the processor carried no configuration to
    /// reconstruct it from. Nothing was written.
    Missing,
}

impl EntryProcessor {
    /// A processor without reconstruction material; an absent entry
    /// reports [`InvocationResult::Missing`].
    pub fn new(command: EntryCommand, now_nanos: u64) -> Self {
        Self {
            command,
            now_nanos,
            config: None,
        }
    }

    /// A processor that reconstructs an absent entry from `config` before
    /// applying its command.
    pub fn with_config(command: EntryCommand, now_nanos: u64, config: LimitsConfig) -> Self {
        Self {
            command,
            now_nanos,
            config: Some(config),
        }
    }

    /// Run the processor against the current entry value.
    ///
    /// Returns the state to persist (`None` leaves the entry absent) and
    /// the invocation result. Pure: backends provide the atomicity, this
    /// provides the transformation.
    pub fn execute(
        &self,
        entry: Option<GridBucketState>,
    ) -> (Option<GridBucketState>, InvocationResult) {
        let mut entry = match entry {
            Some(entry) => entry,
            None => match &self.config {
                Some(config) => {
                    trace!("seeding absent grid entry from carried configuration");
                    GridBucketState::initial(config.clone(), self.now_nanos)
                }
                None => return (None, InvocationResult::Missing),
            },
        };

        let now = self.now_nanos;
        let outcome = match &self.command {
            EntryCommand::TryConsume { tokens } => CommandOutcome::Consumed(
                algorithm::try_consume(&mut entry.state, &entry.config, now, *tokens),
            ),
            EntryCommand::ConsumeAsMuchAsPossible { limit } => CommandOutcome::ConsumedAmount(
                algorithm::consume_as_much_as_possible(&mut entry.state, &entry.config, now, *limit),
            ),
            EntryCommand::Reserve {
                tokens,
                max_wait_nanos,
            } => CommandOutcome::Wait(
                match algorithm::reserve(&mut entry.state, &entry.config, now, *tokens, *max_wait_nanos)
                {
                    Reservation::Wait(wait) => Some(wait),
                    Reservation::Rejected => None,
                },
            ),
            EntryCommand::AddTokens { tokens } => {
                algorithm::add_tokens(&mut entry.state, &entry.config, now, *tokens);
                CommandOutcome::Done
            }
            EntryCommand::GetAvailableTokens => {
                algorithm::refill(&mut entry.state, &entry.config, now);
                CommandOutcome::Available(entry.state.available_tokens())
            }
            EntryCommand::ReplaceConfiguration { config } => {
                match entry.state.migrate(&entry.config, config, now) {
                    Ok(state) => {
                        entry.state = state;
                        entry.config = config.clone();
                        CommandOutcome::Done
                    }
                    Err(e) => CommandOutcome::Conflict(e.to_string()),
                }
            }
        };
        (Some(entry), InvocationResult::Outcome(outcome))
    }
}
