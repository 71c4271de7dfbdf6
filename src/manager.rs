//! Binding manager: delivers bound cluster changes to remote peers once their sessions are open.
//!
//! When a local (endpoint, cluster) changes, every matching binding is handled:
//! - group bindings are delivered right away without a session
//! - unicast bindings with an open session are delivered right away
//! - other unicast bindings are queued in the [PendingNotificationMap] and a session is requested
//!
//! Session results arrive as [SessionEvent]s. Success flushes everything queued for the peer through
//! the bound device changed handler, failure hands every queued context to the context release handler.
//!
//! ```
//! # use matc_binding::{binding_table::BindingEntry, config::BindingConfig, manager::BindingManager};
//! # use matc_binding::session::{SessionCallback, SessionProvider};
//! # use matc_binding::types::{FabricIndex, PeerId};
//! struct Sessions(Vec<SessionCallback<u64>>);
//!
//! impl SessionProvider for Sessions {
//!     type Session = u64;
//!     fn find_existing_session(&self, _peer: PeerId) -> Option<u64> { None }
//!     fn find_or_establish_session(&mut self, _peer: PeerId, cb: SessionCallback<u64>) { self.0.push(cb) }
//!     fn release_session(&mut self, _peer: PeerId) {}
//!     fn release_sessions_for_fabric(&mut self, _fabric_index: FabricIndex) {}
//! }
//!
//! let config = BindingConfig {
//!     bindings: vec![BindingEntry::unicast(1, 300, 1, 1, Some(6))],
//!     ..Default::default()
//! };
//! let mut manager: BindingManager<bool, Sessions, _> =
//!     BindingManager::from_config(Sessions(Vec::new()), &config).unwrap();
//! manager.register_bound_device_changed_handler(|binding, session, on| {
//!     println!("send on/off {} to {:?} over {:?}", on, binding.peer(), session);
//! });
//! manager.register_bound_device_context_release_handler(|_on| {});
//!
//! manager.notify_bound_cluster_changed(1, 6, true).unwrap();
//! assert_eq!(manager.pending_peer_count(), 1);
//!
//! // session layer reports success later
//! let cb = manager.provider_mut().0.remove(0);
//! cb.connected(7);
//! manager.process_session_events();
//! assert_eq!(manager.pending_peer_count(), 0);
//! ```

use tokio::sync::mpsc;

use crate::{
    binding_table::{BindingEntry, BindingTable, BindingTableSource},
    clock::{Clock, SystemClock},
    config::BindingConfig,
    error::{BindingError, Result},
    pending::{ClusterPath, PeerNotificationRecord, PendingNotificationMap},
    session::{SessionCallback, SessionEvent, SessionProvider},
    types::{ClusterId, EndpointId, FabricIndex, NodeId, PeerId},
};

/// Called once per binding a change is delivered to. The session is None for group bindings.
pub type BoundDeviceChangedHandler<C, S> = Box<dyn FnMut(&BindingEntry, Option<&S>, &C) + Send>;

/// Receives contexts which are dropped without delivery (eviction, session failure, binding removal).
pub type BoundDeviceContextReleaseHandler<C> = Box<dyn FnMut(C) + Send>;

pub struct BindingManager<C, P: SessionProvider, T> {
    provider: P,
    bindings: T,
    pending: PendingNotificationMap<C>,
    establish_sessions_on_init: bool,
    changed_handler: Option<BoundDeviceChangedHandler<C, P::Session>>,
    release_handler: Option<BoundDeviceContextReleaseHandler<C>>,
    events_tx: mpsc::UnboundedSender<SessionEvent<P::Session>>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent<P::Session>>>,
    next_attempt: u64,
}

impl<C, P, T> BindingManager<C, P, T>
where
    C: Clone,
    P: SessionProvider,
    T: BindingTableSource,
{
    pub fn new(provider: P, bindings: T, config: &BindingConfig) -> Self {
        Self::with_clock(provider, bindings, config, Box::new(SystemClock))
    }

    pub fn with_clock(provider: P, bindings: T, config: &BindingConfig, clock: Box<dyn Clock>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            provider,
            bindings,
            pending: PendingNotificationMap::with_clock(
                config.binding_table_size,
                config.max_pending_notifications,
                clock,
            ),
            establish_sessions_on_init: config.establish_sessions_on_init,
            changed_handler: None,
            release_handler: None,
            events_tx,
            events_rx: Some(events_rx),
            next_attempt: 1,
        }
    }

    pub fn register_bound_device_changed_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&BindingEntry, Option<&P::Session>, &C) + Send + 'static,
    {
        self.changed_handler = Some(Box::new(handler));
    }

    pub fn register_bound_device_context_release_handler<F>(&mut self, handler: F)
    where
        F: FnMut(C) + Send + 'static,
    {
        self.release_handler = Some(Box::new(handler));
    }

    /// Request sessions to all unicast peers of the binding table when configured to do so.
    pub fn init(&mut self) -> Result<()> {
        if !self.establish_sessions_on_init {
            return Ok(());
        }
        let mut peers: Vec<PeerId> = self.bindings.entries().filter_map(|e| e.peer()).collect();
        peers.sort();
        peers.dedup();
        log::debug!("establishing sessions to {} bound peers", peers.len());
        for peer in peers {
            self.unicast_binding_created(peer.fabric_index, peer.node_id)?;
        }
        Ok(())
    }

    /// Local `cluster` on `endpoint` changed; deliver or queue `context` for every matching binding.
    pub fn notify_bound_cluster_changed(
        &mut self,
        endpoint: EndpointId,
        cluster: ClusterId,
        context: C,
    ) -> Result<()> {
        if self.changed_handler.is_none() {
            log::debug!(
                "no bound device changed handler; ignoring change endpoint:{} cluster:{:#06x}",
                endpoint,
                cluster
            );
            return Ok(());
        }
        let matching: Vec<BindingEntry> = self
            .bindings
            .entries()
            .filter(|e| e.matches(endpoint, cluster))
            .copied()
            .collect();
        log::trace!(
            "change endpoint:{} cluster:{:#06x} matches {} bindings",
            endpoint,
            cluster,
            matching.len()
        );

        for entry in matching {
            let peer = match entry.peer() {
                Some(peer) => peer,
                None => {
                    self.deliver(&entry, None, &context);
                    continue;
                }
            };
            // keep per-peer order: once something is queued, later changes queue behind it
            if !self.pending.contains(peer) {
                if let Some(session) = self.provider.find_existing_session(peer) {
                    self.deliver(&entry, Some(&session), &context);
                    continue;
                }
            }
            self.enqueue_unicast_notification(
                peer.fabric_index,
                peer.node_id,
                endpoint,
                cluster,
                context.clone(),
            )?;
        }
        Ok(())
    }

    /// Queue `context` for the peer and request a session if none is being established for it yet.
    pub fn enqueue_unicast_notification(
        &mut self,
        fabric_index: FabricIndex,
        node_id: NodeId,
        endpoint: EndpointId,
        cluster: ClusterId,
        context: C,
    ) -> Result<()> {
        let peer = PeerId::new(fabric_index, node_id);
        let attempt = self.next_attempt;
        let enqueued = self.pending.add_pending_notification(
            peer,
            ClusterPath::new(endpoint, cluster),
            context,
            attempt,
        )?;
        if let Some(evicted) = enqueued.evicted {
            self.release_record(evicted);
        }
        if enqueued.created {
            self.next_attempt += 1;
            log::debug!(
                "queued endpoint:{} cluster:{:#06x} for {}; requesting session (attempt {})",
                endpoint,
                cluster,
                peer,
                attempt
            );
            self.request_session(peer, attempt);
        }
        Ok(())
    }

    /// Eagerly open a session to a newly bound peer. Does not touch the pending pool.
    pub fn unicast_binding_created(&mut self, fabric_index: FabricIndex, node_id: NodeId) -> Result<()> {
        let peer = PeerId::new(fabric_index, node_id);
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        log::debug!("binding to {} created; requesting session (attempt {})", peer, attempt);
        self.request_session(peer, attempt);
        Ok(())
    }

    /// No binding references the peer anymore: drop what is queued for it and release its session.
    pub fn last_unicast_binding_removed(&mut self, fabric_index: FabricIndex, node_id: NodeId) -> Result<()> {
        let peer = PeerId::new(fabric_index, node_id);
        if let Some(record) = self.pending.take(peer) {
            log::debug!("last binding to {} removed; dropping {} pending", peer, record.len());
            self.release_record(record);
        }
        self.provider.release_session(peer);
        Ok(())
    }

    pub fn fabric_removed(&mut self, fabric_index: FabricIndex) {
        for record in self.pending.remove_all_for_fabric(fabric_index) {
            self.release_record(record);
        }
        self.provider.release_sessions_for_fabric(fabric_index);
    }

    /// Hand everything still queued to the context release handler. Sessions are left to the provider.
    pub fn release_all_pending(&mut self) {
        let records = self.pending.take_all();
        if !records.is_empty() {
            log::debug!("releasing pending notifications of {} peers", records.len());
        }
        for record in records {
            self.release_record(record);
        }
    }

    pub fn handle_session_event(&mut self, event: SessionEvent<P::Session>) {
        match event {
            SessionEvent::Established { peer, session, .. } => self.on_session_established(peer, session),
            SessionEvent::Failed {
                peer,
                attempt,
                error,
            } => self.on_session_failed(peer, attempt, error),
        }
    }

    /// Handle all session events already posted. Returns how many were handled.
    pub fn process_session_events(&mut self) -> usize {
        let mut events = Vec::new();
        if let Some(rx) = self.events_rx.as_mut() {
            while let Ok(ev) = rx.try_recv() {
                events.push(ev);
            }
        }
        let n = events.len();
        for ev in events {
            self.handle_session_event(ev);
        }
        n
    }

    /// Hand the session event receiver to an external event loop.
    /// Afterwards [BindingManager::process_session_events] does nothing.
    pub fn take_session_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent<P::Session>>> {
        self.events_rx.take()
    }

    pub fn pending_peer_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_peers(&self) -> Vec<PeerId> {
        self.pending.peers()
    }

    /// Cluster paths queued for `peer` in delivery order.
    pub fn pending_notifications(&self, peer: PeerId) -> Vec<ClusterPath> {
        self.pending.get(peer).map(|r| r.paths()).unwrap_or_default()
    }

    pub fn bindings(&self) -> &T {
        &self.bindings
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    fn request_session(&mut self, peer: PeerId, attempt: u64) {
        let callback = SessionCallback::new(peer, attempt, self.events_tx.clone());
        self.provider.find_or_establish_session(peer, callback);
    }

    fn deliver(&mut self, entry: &BindingEntry, session: Option<&P::Session>, context: &C) {
        if let Some(handler) = self.changed_handler.as_mut() {
            handler(entry, session, context);
        }
    }

    fn on_session_established(&mut self, peer: PeerId, session: P::Session) {
        let record = match self.pending.take(peer) {
            Some(r) => r,
            None => {
                log::trace!("session to {} established; nothing pending", peer);
                return;
            }
        };
        log::debug!("session to {} established; flushing {} pending", peer, record.len());
        for notification in record.into_notifications() {
            let path = notification.path;
            let mut delivered = false;
            if let Some(handler) = self.changed_handler.as_mut() {
                for entry in self
                    .bindings
                    .entries()
                    .filter(|e| e.peer() == Some(peer) && e.matches(path.endpoint, path.cluster))
                {
                    handler(entry, Some(&session), &notification.context);
                    delivered = true;
                }
            }
            if !delivered {
                log::debug!(
                    "no binding left for {} endpoint:{} cluster:{:#06x}",
                    peer,
                    path.endpoint,
                    path.cluster
                );
                self.release_context(notification.context);
            }
        }
    }

    fn on_session_failed(&mut self, peer: PeerId, attempt: u64, error: anyhow::Error) {
        match self.pending.get(peer) {
            None => {
                log::debug!("session to {} failed: {:?}; nothing pending", peer, error);
                return;
            }
            Some(r) if r.connect_attempt() != attempt => {
                log::debug!(
                    "ignoring failure of stale attempt {} to {} (pending attempt {})",
                    attempt,
                    peer,
                    r.connect_attempt()
                );
                return;
            }
            Some(_) => {}
        }
        if let Some(record) = self.pending.take(peer) {
            log::debug!(
                "session to {} failed: {:?}; dropping {} pending",
                peer,
                error,
                record.len()
            );
            self.release_record(record);
        }
    }

    fn release_record(&mut self, record: PeerNotificationRecord<C>) {
        for notification in record.into_notifications() {
            self.release_context(notification.context);
        }
    }

    fn release_context(&mut self, context: C) {
        debug_assert!(
            self.release_handler.is_some(),
            "context released without bound device context release handler"
        );
        match self.release_handler.as_mut() {
            Some(handler) => handler(context),
            None => log::warn!("no bound device context release handler; dropping context"),
        }
    }
}

impl<C, P> BindingManager<C, P, BindingTable>
where
    C: Clone,
    P: SessionProvider,
{
    /// Build the binding table and the pending pool from `config`.
    pub fn from_config(provider: P, config: &BindingConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BindingError::InvalidArgument(e.to_string()))?;
        let table = BindingTable::from_entries(config.binding_table_size, &config.bindings)?;
        Ok(Self::new(provider, table, config))
    }

    /// Store a binding. A new unicast binding triggers an eager session request.
    pub fn add_binding(&mut self, entry: BindingEntry) -> Result<usize> {
        let before = self.bindings.len();
        let index = self.bindings.add(entry)?;
        if self.bindings.len() > before {
            if let Some(peer) = entry.peer() {
                self.unicast_binding_created(peer.fabric_index, peer.node_id)?;
            }
        }
        Ok(index)
    }

    /// Remove the binding at `index`. Removing the last unicast binding of a peer releases it.
    pub fn remove_binding(&mut self, index: usize) -> Result<BindingEntry> {
        let entry = self.bindings.remove_at(index)?;
        if let Some(peer) = entry.peer() {
            if !self.bindings.has_unicast_to(peer) {
                self.last_unicast_binding_removed(peer.fabric_index, peer.node_id)?;
            }
        }
        Ok(entry)
    }

    /// Remove all bindings of a fabric along with everything queued for it.
    pub fn remove_bindings_for_fabric(&mut self, fabric_index: FabricIndex) -> Vec<BindingEntry> {
        let removed = self.bindings.remove_all_for_fabric(fabric_index);
        self.fabric_removed(fabric_index);
        removed
    }
}
