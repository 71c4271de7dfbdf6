//! Matter binding manager
//!
//! Delivers changes of local clusters to the devices they are bound to. A device may be
//! reachable only after a CASE session is established; this library queues changes until then.
//! Following are main parts of api:
//! - [BindingManager](manager::BindingManager) - Takes change notifications, delivers them right away
//!                             when possible and queues them per peer otherwise.
//!                             Queued changes are flushed when the session opens and released when it fails.
//! - [SessionProvider](session::SessionProvider) - Trait for the secure session layer. The manager asks it for sessions
//!                             and receives the outcome through [SessionCallback](session::SessionCallback).
//! - [BindingTable](binding_table::BindingTable) - Bounded in-memory binding table. Any [BindingTableSource](binding_table::BindingTableSource)
//!                             can be used instead.
//! - [PendingNotificationMap](pending::PendingNotificationMap) - Bounded per-peer queue with LRU eviction.
//! - [service](service) - Runs the manager in a tokio task and hands out cloneable [BindingHandle](service::BindingHandle)s.
//! - [config](config) - JSON configuration (table size, queue depth, initial bindings).
//!
//! Example how to run the manager as a service with session provider implemented elsewhere:
//! ```no_run
//! # use matc_binding::{config, manager::BindingManager, service};
//! # use matc_binding::session::{SessionCallback, SessionProvider};
//! # use matc_binding::types::{FabricIndex, PeerId};
//! # use std::sync::Arc;
//! # struct CaseSessions;
//! # impl SessionProvider for CaseSessions {
//! #     type Session = Arc<String>;
//! #     fn find_existing_session(&self, _peer: PeerId) -> Option<Arc<String>> { None }
//! #     fn find_or_establish_session(&mut self, _peer: PeerId, _cb: SessionCallback<Arc<String>>) {}
//! #     fn release_session(&mut self, _peer: PeerId) {}
//! #     fn release_sessions_for_fabric(&mut self, _fabric_index: FabricIndex) {}
//! # }
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = config::load_config("./binding.json")?;
//! let mut manager: BindingManager<u8, CaseSessions, _> = BindingManager::from_config(CaseSessions, &config)?;
//! manager.register_bound_device_changed_handler(|_binding, _session, _level| {
//!     // send MoveToLevel with `level` to binding over session
//! });
//! manager.register_bound_device_context_release_handler(|_level| {});
//! manager.init()?;
//! let handle = service::spawn(manager)?;
//!
//! // level control server on endpoint 1 changed its current level
//! handle.notify_bound_cluster_changed(1, 0x0008, 50).await?;
//! # Ok(())
//! # }
//! ```
//!
//!
#![doc = include_str!("../readme.md")]

pub mod binding_table;
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod pending;
pub mod ring;
pub mod service;
pub mod session;
pub mod types;
