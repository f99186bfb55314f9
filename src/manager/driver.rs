//! The event loop owning every piece of mutable engine state.
//!
//! The driver consumes three sources in one `select!`: caller commands,
//! transport events, and the earliest watchdog deadline. All state mutation
//! happens here on one task, which is what makes the registry's dual index
//! and the active counter safe without locks.

use super::registry::Registry;
use super::watchdog::Watchdog;
use crate::config::Config;
use crate::error::Result;
use crate::transport::{Transport, TransportEvent};
use crate::types::{AppendOptions, Event, FetchRequest, QueueStats, TaskId, TaskSnapshot};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A caller operation marshaled into the driver loop
pub(crate) enum Command {
    Append {
        request: FetchRequest,
        options: AppendOptions,
        respond: oneshot::Sender<TaskId>,
    },
    Start {
        id: TaskId,
        respond: oneshot::Sender<Result<()>>,
    },
    Restart {
        id: TaskId,
        respond: oneshot::Sender<Result<()>>,
    },
    Erase {
        id: TaskId,
        respond: oneshot::Sender<Result<()>>,
    },
    Clear {
        respond: oneshot::Sender<usize>,
    },
    SetMaxConcurrent {
        limit: usize,
        respond: oneshot::Sender<Result<()>>,
    },
    MaxConcurrent {
        respond: oneshot::Sender<usize>,
    },
    ActiveCount {
        respond: oneshot::Sender<usize>,
    },
    Task {
        id: TaskId,
        respond: oneshot::Sender<Option<TaskSnapshot>>,
    },
    Tasks {
        respond: oneshot::Sender<Vec<TaskSnapshot>>,
    },
    Stats {
        respond: oneshot::Sender<QueueStats>,
    },
}

pub(crate) struct Driver {
    pub(super) config: Config,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) registry: Registry,
    pub(super) watchdog: Watchdog,
    /// Concurrency bound; runtime-mutable via `SetMaxConcurrent`
    pub(super) max_concurrent: usize,
    /// Number of tasks currently holding a transport handle
    pub(super) active: usize,
    pub(super) event_tx: broadcast::Sender<Event>,
    /// Handed to the transport on every `issue` so its events land in our loop
    pub(super) transport_tx: mpsc::Sender<TransportEvent>,
}

impl Driver {
    pub(crate) fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        event_tx: broadcast::Sender<Event>,
        transport_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let max_concurrent = config.max_concurrent;
        Self {
            config,
            transport,
            registry: Registry::new(),
            watchdog: Watchdog::new(),
            max_concurrent,
            active: 0,
            event_tx,
            transport_tx,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        debug!("driver loop started");
        loop {
            let deadline = self.watchdog.next_deadline();
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.abort_all().await;
                    break;
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Every manager clone is gone; nothing can reach us anymore
                            self.abort_all().await;
                            break;
                        }
                    }
                }
                event = transport_events.recv() => {
                    // recv() cannot yield None here: we hold a sender clone in transport_tx
                    if let Some(event) = event {
                        self.handle_transport_event(event).await;
                    }
                }
                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    self.handle_expired_watchdogs().await;
                }
            }
        }
        debug!("driver loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Append {
                request,
                options,
                respond,
            } => {
                respond.send(self.append(request, options)).ok();
            }
            Command::Start { id, respond } => {
                respond.send(self.start(id).await).ok();
            }
            Command::Restart { id, respond } => {
                respond.send(self.restart(id).await).ok();
            }
            Command::Erase { id, respond } => {
                respond.send(self.erase(id).await).ok();
            }
            Command::Clear { respond } => {
                respond.send(self.clear().await).ok();
            }
            Command::SetMaxConcurrent { limit, respond } => {
                respond.send(self.set_max_concurrent(limit)).ok();
            }
            Command::MaxConcurrent { respond } => {
                respond.send(self.max_concurrent).ok();
            }
            Command::ActiveCount { respond } => {
                respond.send(self.active).ok();
            }
            Command::Task { id, respond } => {
                respond
                    .send(self.registry.get(id).map(|record| record.snapshot()))
                    .ok();
            }
            Command::Tasks { respond } => {
                respond
                    .send(self.registry.iter().map(|record| record.snapshot()).collect())
                    .ok();
            }
            Command::Stats { respond } => {
                respond.send(self.registry.stats(self.max_concurrent)).ok();
            }
        }
    }

    /// Fan an event out to all subscribers
    pub(super) fn emit(&self, event: Event) {
        // send() errs when nobody is subscribed; events are fire-and-forget
        self.event_tx.send(event).ok();
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // The select branch is disabled when no deadline is armed
        None => std::future::pending().await,
    }
}
