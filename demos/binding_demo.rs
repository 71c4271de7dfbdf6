/// Runs the binding manager against a simulated session layer.
/// - sessions open after `delay_ms`, a share of them (`fail_rate`) fails
/// - an on/off switch on endpoint 1 toggles `changes` times
/// - every delivery and every released change is printed
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use matc_binding::{
    binding_table::BindingEntry,
    config::{self, BindingConfig},
    manager::BindingManager,
    service,
    session::{SessionCallback, SessionProvider},
    types::{FabricIndex, PeerId},
};

const CLUSTER_ID_ON_OFF: u32 = 0x0006;

#[derive(Parser, Debug)]
#[command()]
struct Cli {
    #[clap(long)]
    #[arg(default_value_t = false)]
    verbose: bool,

    /// JSON config; two unicast bindings and one group binding are used when missing
    #[clap(long)]
    config: Option<String>,

    #[clap(long)]
    #[arg(default_value_t = 200)]
    delay_ms: u64,

    #[clap(long)]
    #[arg(default_value_t = 0.3)]
    fail_rate: f64,

    #[clap(long)]
    #[arg(default_value_t = 10)]
    changes: u32,
}

#[derive(Debug)]
struct SimSession {
    peer: PeerId,
}

struct SimulatedSessions {
    delay: Duration,
    fail_rate: f64,
    open: Arc<Mutex<HashSet<PeerId>>>,
}

impl SessionProvider for SimulatedSessions {
    type Session = Arc<SimSession>;

    fn find_existing_session(&self, peer: PeerId) -> Option<Arc<SimSession>> {
        let open = self.open.lock().ok()?;
        open.contains(&peer).then(|| Arc::new(SimSession { peer }))
    }

    fn find_or_establish_session(&mut self, peer: PeerId, callback: SessionCallback<Arc<SimSession>>) {
        let delay = self.delay;
        let fail = rand::random::<f64>() < self.fail_rate;
        let open = self.open.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fail {
                callback.failed(anyhow::anyhow!("CASE with {} timed out", peer));
                return;
            }
            if let Ok(mut open) = open.lock() {
                open.insert(peer);
            }
            callback.connected(Arc::new(SimSession { peer }));
        });
    }

    fn release_session(&mut self, peer: PeerId) {
        if let Ok(mut open) = self.open.lock() {
            open.remove(&peer);
        }
    }

    fn release_sessions_for_fabric(&mut self, fabric_index: FabricIndex) {
        if let Ok(mut open) = self.open.lock() {
            open.retain(|p| p.fabric_index != fabric_index);
        }
    }
}

fn default_config() -> BindingConfig {
    BindingConfig {
        bindings: vec![
            BindingEntry::unicast(1, 300, 1, 1, Some(CLUSTER_ID_ON_OFF)),
            BindingEntry::unicast(1, 301, 1, 2, None),
            BindingEntry::multicast(1, 0x10, 1, Some(CLUSTER_ID_ON_OFF)),
        ],
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = {
        if cli.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        }
    };
    env_logger::Builder::new()
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(log_level)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => default_config(),
    };
    let sessions = SimulatedSessions {
        delay: Duration::from_millis(cli.delay_ms),
        fail_rate: cli.fail_rate,
        open: Arc::new(Mutex::new(HashSet::new())),
    };

    let mut manager: BindingManager<bool, SimulatedSessions, _> = BindingManager::from_config(sessions, &config)?;
    manager.register_bound_device_changed_handler(|binding, session, on| {
        let cmd = if *on { "On" } else { "Off" };
        match (binding, session) {
            (BindingEntry::Multicast { group_id, .. }, _) => {
                log::info!("group {:#x}: {}", group_id, cmd)
            }
            (BindingEntry::Unicast { remote_endpoint, .. }, Some(s)) => {
                log::info!("{} endpoint {}: {}", s.peer, remote_endpoint, cmd)
            }
            (BindingEntry::Unicast { .. }, None) => {
                log::warn!("unicast delivery without session")
            }
        }
    });
    manager.register_bound_device_context_release_handler(|on| {
        log::info!("dropped change to {}", on);
    });
    manager.init()?;
    let handle = service::spawn(manager)?;

    let mut on = false;
    for _ in 0..cli.changes {
        on = !on;
        handle.notify_bound_cluster_changed(1, CLUSTER_ID_ON_OFF, on).await?;
        tokio::time::sleep(Duration::from_millis(cli.delay_ms / 3 + 1)).await;
    }

    tokio::time::sleep(Duration::from_millis(cli.delay_ms * 2)).await;
    let pending = handle.pending_peers().await?;
    log::info!("pending after run: {:?}", pending);
    handle.shutdown();
    // let the service hand what is still queued to the release handler
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
