//! Binding manager running as a tokio task.
//!
//! [spawn] moves the manager into a task which owns it exclusively. All operations and all session
//! results are handled one at a time on that task, so the manager needs no locking.
//! Components which report attribute changes get a cloned [BindingHandle].

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    binding_table::BindingTableSource,
    error::{BindingError, Result},
    manager::BindingManager,
    session::{SessionEvent, SessionProvider},
    types::{ClusterId, EndpointId, FabricIndex, NodeId, PeerId},
};

const COMMAND_QUEUE_SIZE: usize = 32;

enum Command<C> {
    Notify {
        endpoint: EndpointId,
        cluster: ClusterId,
        context: C,
        reply: oneshot::Sender<Result<()>>,
    },
    BindingCreated {
        fabric_index: FabricIndex,
        node_id: NodeId,
        reply: oneshot::Sender<Result<()>>,
    },
    LastBindingRemoved {
        fabric_index: FabricIndex,
        node_id: NodeId,
        reply: oneshot::Sender<Result<()>>,
    },
    FabricRemoved {
        fabric_index: FabricIndex,
        reply: oneshot::Sender<()>,
    },
    PendingPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

/// Cloneable access to a spawned binding manager.
pub struct BindingHandle<C> {
    commands: mpsc::Sender<Command<C>>,
    cancel: CancellationToken,
}

impl<C> Clone for BindingHandle<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Move `manager` into a new task. Call [BindingManager::init] and register handlers before.
pub fn spawn<C, P, T>(mut manager: BindingManager<C, P, T>) -> Result<BindingHandle<C>>
where
    C: Clone + Send + 'static,
    P: SessionProvider + Send + 'static,
    P::Session: Send + 'static,
    T: BindingTableSource + Send + 'static,
{
    let events = manager
        .take_session_events()
        .ok_or_else(|| BindingError::InvalidArgument("session events already taken".to_owned()))?;
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    tokio::spawn(async move {
        service_loop(manager, commands_rx, events, loop_cancel).await;
    });
    Ok(BindingHandle {
        commands: commands_tx,
        cancel,
    })
}

async fn service_loop<C, P, T>(
    mut manager: BindingManager<C, P, T>,
    mut commands: mpsc::Receiver<Command<C>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent<P::Session>>,
    cancel: CancellationToken,
) where
    C: Clone,
    P: SessionProvider,
    T: BindingTableSource,
{
    log::debug!("binding service started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,

            // session results first so flushes are not starved by a busy command queue
            Some(event) = events.recv() => {
                log::trace!("session event for {}", event.peer());
                manager.handle_session_event(event);
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(cmd) => handle_command(&mut manager, cmd),
                    None => break,
                }
            }
        }
    }
    log::debug!(
        "binding service stopped with {} peers pending",
        manager.pending_peer_count()
    );
    manager.release_all_pending();
}

fn handle_command<C, P, T>(manager: &mut BindingManager<C, P, T>, cmd: Command<C>)
where
    C: Clone,
    P: SessionProvider,
    T: BindingTableSource,
{
    match cmd {
        Command::Notify {
            endpoint,
            cluster,
            context,
            reply,
        } => {
            _ = reply.send(manager.notify_bound_cluster_changed(endpoint, cluster, context));
        }
        Command::BindingCreated {
            fabric_index,
            node_id,
            reply,
        } => {
            _ = reply.send(manager.unicast_binding_created(fabric_index, node_id));
        }
        Command::LastBindingRemoved {
            fabric_index,
            node_id,
            reply,
        } => {
            _ = reply.send(manager.last_unicast_binding_removed(fabric_index, node_id));
        }
        Command::FabricRemoved { fabric_index, reply } => {
            manager.fabric_removed(fabric_index);
            _ = reply.send(());
        }
        Command::PendingPeers { reply } => {
            _ = reply.send(manager.pending_peers());
        }
    }
}

impl<C> BindingHandle<C> {
    async fn call<R>(&self, cmd: Command<C>, rx: oneshot::Receiver<R>) -> Result<R> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| BindingError::ServiceStopped)?;
        rx.await.map_err(|_| BindingError::ServiceStopped)
    }

    pub async fn notify_bound_cluster_changed(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        context: C,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Notify {
            endpoint,
            cluster,
            context,
            reply,
        };
        self.call(cmd, rx).await?
    }

    pub async fn unicast_binding_created(&self, fabric_index: FabricIndex, node_id: NodeId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::BindingCreated {
            fabric_index,
            node_id,
            reply,
        };
        self.call(cmd, rx).await?
    }

    pub async fn last_unicast_binding_removed(&self, fabric_index: FabricIndex, node_id: NodeId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::LastBindingRemoved {
            fabric_index,
            node_id,
            reply,
        };
        self.call(cmd, rx).await?
    }

    pub async fn fabric_removed(&self, fabric_index: FabricIndex) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::FabricRemoved { fabric_index, reply }, rx).await
    }

    /// Peers with queued notifications.
    pub async fn pending_peers(&self) -> Result<Vec<PeerId>> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::PendingPeers { reply }, rx).await
    }

    /// Stop the service task. Queued notifications go to the context release handler.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }
}
