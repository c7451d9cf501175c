//! Actor-based concurrency for the ledger
//!
//! One Tokio task owns the state, the chain head and the storage. Commands
//! arrive through a bounded mailbox and run to completion one at a time, so
//! every caller observes a single total order.
//!
//! # Command pipeline
//!
//! ```text
//!  LedgerHandle (Clone) ──mpsc──▶ LedgerActor
//!                                   │
//!                                   ├─ clone state (staged copy)
//!                                   ├─ SuretyState::apply
//!                                   ├─ ChainHead::seal
//!                                   ├─ Storage::commit (WriteBatch)
//!                                   ├─ swap in staged state + head
//!                                   ├─ broadcast sealed events
//!                                   └─ PayoutTransfer::transfer
//! ```
//!
//! Any error up to and including the commit discards the staged copy and
//! leaves the head where it was. A payout is transferred only once its
//! withdrawal is durable; a failed transfer appends a `PayoutReverted` entry
//! restoring the previous state. A recipient that calls back into the ledger
//! queues behind the current command and sees its committed effects.

use crate::{
    config::{Config, PolicyConfig},
    entropy::IndexSource,
    events::{verify_chain, ChainHead, EventKind, LedgerEvent},
    metrics::Metrics,
    state::{Command, Outcome, SuretyState},
    storage::Storage,
    transfer::{Payout, PayoutTransfer},
    types::Caller,
    Error, Result,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Page size used when scanning the whole log
const VERIFY_PAGE: usize = 1024;

/// Read-only closure run against the current state
type Inspector = Box<dyn FnOnce(&SuretyState) + Send>;

/// Message sent to the ledger actor
pub(crate) enum LedgerMessage {
    /// Execute a mutating command
    Execute {
        caller: Caller,
        value: Decimal,
        command: Command,
        response: oneshot::Sender<Result<Outcome>>,
    },

    /// Run a read-only closure against the current state
    Inspect(Inspector),

    /// Read events from the log
    EventsSince {
        from: u64,
        limit: usize,
        response: oneshot::Sender<Result<Vec<LedgerEvent>>>,
    },

    /// Re-hash the whole log and compare it with the in-memory head
    VerifyChain {
        response: oneshot::Sender<Result<ChainHead>>,
    },

    /// Shutdown actor, acknowledging once storage is closed
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that processes ledger messages
pub(crate) struct LedgerActor {
    state: SuretyState,
    head: ChainHead,
    policy: PolicyConfig,
    storage: Storage,
    entropy: Box<dyn IndexSource>,
    transfer: Arc<dyn PayoutTransfer>,
    events: broadcast::Sender<LedgerEvent>,
    metrics: Metrics,
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Run the actor event loop
    async fn run(mut self) {
        let mut ack = None;

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Execute {
                    caller,
                    value,
                    command,
                    response,
                } => {
                    let result = self.execute(caller, value, command);
                    let _ = response.send(result);
                }

                LedgerMessage::Inspect(inspect) => inspect(&self.state),

                LedgerMessage::EventsSince {
                    from,
                    limit,
                    response,
                } => {
                    let _ = response.send(self.storage.events_since(from, limit));
                }

                LedgerMessage::VerifyChain { response } => {
                    let _ = response.send(self.verify_chain());
                }

                LedgerMessage::Shutdown { response } => {
                    ack = Some(response);
                    break;
                }
            }
        }

        let next_sequence = self.head.next_sequence;
        drop(self);
        tracing::info!(next_sequence, "Ledger actor stopped");

        if let Some(response) = ack {
            let _ = response.send(());
        }
    }

    fn execute(&mut self, caller: Caller, value: Decimal, command: Command) -> Result<Outcome> {
        let name = command.name();
        let result = self.try_execute(&caller, value, command);

        match &result {
            Ok(outcome) => {
                self.metrics.record_command(name, "ok");
                if let Outcome::Response(response) = outcome {
                    self.metrics.record_oracle_response(response.label());
                }
            }
            Err(e) if e.is_rejection() => {
                self.metrics.record_command(name, e.kind());
                tracing::debug!(
                    command = name,
                    account = %caller.account,
                    error = %e,
                    "Command rejected"
                );
            }
            Err(e) => {
                self.metrics.record_command(name, e.kind());
                tracing::error!(command = name, error = %e, "Command failed");
            }
        }

        result
    }

    fn try_execute(&mut self, caller: &Caller, value: Decimal, command: Command) -> Result<Outcome> {
        let mut staged = self.state.clone();
        let applied = staged.apply(&self.policy, caller, value, command, self.entropy.as_mut())?;
        let (head, sealed) = self.head.seal(applied.events)?;
        self.storage.commit(&staged, &head, &sealed)?;

        let previous = std::mem::replace(&mut self.state, staged);
        self.head = head;
        self.publish(sealed);

        if let Some(payout) = applied.payout {
            if let Err(e) = self.transfer.transfer(&payout) {
                self.revert_payout(previous, &payout, &e);
                return Err(e);
            }
            self.metrics.record_payouts(1);
        }

        Ok(applied.outcome)
    }

    /// Restore the state from before a withdrawal whose transfer failed
    ///
    /// The withdrawal is already in the log, so the reversal is appended as
    /// its own entry. If that commit fails too the credit stays marked as
    /// withdrawn: the passenger is owed the amount but no value was created.
    fn revert_payout(&mut self, previous: SuretyState, payout: &Payout, cause: &Error) {
        let reverted = EventKind::PayoutReverted {
            account: payout.to.clone(),
            amount: payout.amount,
        };
        let result = self.head.seal(vec![reverted]).and_then(|(head, sealed)| {
            self.storage.commit(&previous, &head, &sealed)?;
            Ok((head, sealed))
        });

        match result {
            Ok((head, sealed)) => {
                tracing::warn!(
                    to = %payout.to,
                    amount = %payout.amount,
                    error = %cause,
                    "Payout transfer failed, withdrawal reverted"
                );
                self.state = previous;
                self.head = head;
                self.publish(sealed);
            }
            Err(e) => {
                tracing::error!(
                    to = %payout.to,
                    amount = %payout.amount,
                    error = %e,
                    transfer_error = %cause,
                    "Payout transfer failed and reversal could not be committed"
                );
            }
        }
    }

    /// Update metrics and broadcast committed events
    fn publish(&self, sealed: Vec<LedgerEvent>) {
        self.metrics.record_events(sealed.len());
        self.metrics
            .update_pool_balance(self.state.pool().balance().trunc().to_i64().unwrap_or(i64::MAX));

        for event in sealed {
            tracing::debug!(sequence = event.sequence, event = event.kind.name(), "Event appended");
            // No subscribers is not an error
            let _ = self.events.send(event);
        }
    }

    fn verify_chain(&self) -> Result<ChainHead> {
        let mut head = ChainHead::default();

        loop {
            let page = self.storage.events_since(head.next_sequence, VERIFY_PAGE)?;
            if page.is_empty() {
                break;
            }
            head = verify_chain(&head, &page)?;
        }

        if head != self.head {
            return Err(Error::InvariantViolation(format!(
                "stored log ends at {} but ledger head is at {}",
                head.next_sequence, self.head.next_sequence
            )));
        }

        Ok(head)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    events: broadcast::Sender<LedgerEvent>,
}

impl LedgerHandle {
    async fn send(&self, msg: LedgerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }

    /// Execute a mutating command
    pub async fn execute(&self, caller: Caller, value: Decimal, command: Command) -> Result<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Execute {
            caller,
            value,
            command,
            response: tx,
        })
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run `f` against the current state and return its result
    pub async fn inspect<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&SuretyState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Inspect(Box::new(move |state| {
            let _ = tx.send(f(state));
        })))
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Read up to `limit` events starting at sequence `from`
    pub async fn events_since(&self, from: u64, limit: usize) -> Result<Vec<LedgerEvent>> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::EventsSince {
            from,
            limit,
            response: tx,
        })
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Verify the stored hash chain
    pub async fn verify_chain(&self) -> Result<ChainHead> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::VerifyChain { response: tx }).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Receiver for events committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Shutdown actor and wait for storage to close
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Shutdown { response: tx }).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Actor stopped before acknowledging".to_string()))
    }
}

/// Restore or create the ledger state and spawn the actor
///
/// A fresh data directory gets the genesis state and its events committed
/// before the actor accepts any message.
pub fn spawn_ledger_actor(
    config: &Config,
    storage: Storage,
    transfer: Arc<dyn PayoutTransfer>,
    entropy: Box<dyn IndexSource>,
    metrics: Metrics,
) -> Result<LedgerHandle> {
    let (state, head) = match storage.load()? {
        Some(snapshot) => {
            tracing::info!(
                next_sequence = snapshot.head.next_sequence,
                "Restored ledger state"
            );
            (snapshot.state, snapshot.head)
        }
        None => {
            let (state, kinds) = SuretyState::genesis(config);
            let (head, sealed) = ChainHead::default().seal(kinds)?;
            storage.commit(&state, &head, &sealed)?;
            metrics.record_events(sealed.len());
            tracing::info!(
                owner = %config.owner,
                genesis_airline = %config.genesis.airline,
                "Initialized ledger at genesis"
            );
            (state, head)
        }
    };

    let (tx, rx) = mpsc::channel(config.actor.mailbox_capacity);
    let (events, _) = broadcast::channel(config.actor.event_buffer);

    let actor = LedgerActor {
        state,
        head,
        policy: config.policy.clone(),
        storage,
        entropy,
        transfer,
        events: events.clone(),
        metrics,
        mailbox: rx,
    };

    tokio::spawn(async move {
        actor.run().await;
    });

    Ok(LedgerHandle { sender: tx, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::ScriptedIndexSource;
    use crate::state::{AdminCommand, Operation};
    use crate::transfer::InMemoryWallet;
    use crate::types::AccountId;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn spawn(config: &Config) -> LedgerHandle {
        let storage = Storage::open(config).unwrap();
        spawn_ledger_actor(
            config,
            storage,
            Arc::new(InMemoryWallet::new()),
            Box::new(ScriptedIndexSource::new([])),
            Metrics::new().unwrap(),
        )
        .unwrap()
    }

    fn caller(config: &Config, account: &str) -> Caller {
        Caller::new(AccountId::new(account), config.app_component.clone())
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (config, _temp) = test_config();
        let handle = spawn(&config);

        handle.shutdown().await.unwrap();
        assert!(handle.inspect(|_| ()).await.is_err());
    }

    #[tokio::test]
    async fn test_genesis_events_committed() {
        let (config, _temp) = test_config();
        let handle = spawn(&config);

        let events = handle.events_since(0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind.name(), "AirlineDirectRegistration");

        let head = handle.verify_chain().await.unwrap();
        assert_eq!(head.next_sequence, 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_command_appends_nothing() {
        let (config, _temp) = test_config();
        let handle = spawn(&config);
        let mut rx = handle.subscribe();

        let result = handle
            .execute(
                caller(&config, "stranger"),
                Decimal::ZERO,
                AdminCommand::SetOperationalStatus { operational: false }.into(),
            )
            .await;
        assert!(matches!(result, Err(Error::AccessDenied(_))));

        assert_eq!(handle.events_since(0, 10).await.unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
        assert!(handle.inspect(|s| s.access().is_operational()).await.unwrap());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_committed_events_are_broadcast() {
        let (config, _temp) = test_config();
        let handle = spawn(&config);
        let mut rx = handle.subscribe();

        handle
            .execute(
                caller(&config, "airline-genesis"),
                Decimal::from(10),
                Operation::FundAirline.into(),
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.kind.name(), "AirlineFunded");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_restores_state() {
        let (config, _temp) = test_config();

        let handle = spawn(&config);
        handle
            .execute(
                caller(&config, "airline-genesis"),
                Decimal::from(10),
                Operation::FundAirline.into(),
            )
            .await
            .unwrap();
        handle.shutdown().await.unwrap();

        let handle = spawn(&config);
        let funded = handle
            .inspect(|s| s.funding().is_funded(&AccountId::new("airline-genesis")))
            .await
            .unwrap();
        assert!(funded);
        assert_eq!(handle.verify_chain().await.unwrap().next_sequence, 2);

        handle.shutdown().await.unwrap();
    }
}
