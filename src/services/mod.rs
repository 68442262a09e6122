//! BreezServices - the session handle.
//!
//! A session is created by [`BreezServices::connect`] (one shot) or by
//! [`BreezServices::init_services`] followed by [`BreezServices::start`]. Only one
//! session may run per process; the guard is taken before any network work so a
//! concurrent connect fails fast with [`SdkError::AlreadyConnected`].

mod builder;
mod config;

pub use builder::SdkBuilder;
pub use config::{default_config, Config, EnvironmentType, GreenlightNodeConfig, Network, NodeConfig};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{SdkError, SdkResult};
use crate::events::{spawn_delivery, DeliveryEnd, EventListener};
use crate::models::{BreezEvent, ConnectRequest, GreenlightCredentials, NodeState};
use crate::node_api::NodeApi;
use crate::runtime::Shutdown;
use crate::seed::Seed;
use crate::signer;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide single-session guard. Released on drop.
pub(crate) struct SessionGuard {
    _private: (),
}

impl SessionGuard {
    pub(crate) fn acquire() -> SdkResult<Self> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionGuard { _private: () })
            .map_err(|_| SdkError::AlreadyConnected)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

struct Running {
    id: u64,
    _guard: SessionGuard,
    shutdown: Shutdown,
    delivery: JoinHandle<()>,
    local_events: mpsc::UnboundedSender<BreezEvent>,
}

/// Facade and single entry point for a connected node session.
pub struct BreezServices {
    config: Config,
    node_api: Arc<dyn NodeApi>,
    listener: Arc<dyn EventListener>,
    running: Arc<Mutex<Option<Running>>>,
}

impl BreezServices {
    pub(crate) fn new(config: Config, node_api: Arc<dyn NodeApi>, listener: Box<dyn EventListener>) -> Self {
        Self { config, node_api, listener: Arc::from(listener), running: Arc::new(Mutex::new(None)) }
    }

    /// Connect to the node described by the request and start the session.
    pub async fn connect(req: ConnectRequest, listener: Box<dyn EventListener>) -> SdkResult<Arc<BreezServices>> {
        let ConnectRequest { config, seed } = req;
        SdkBuilder::new(config).connect(seed, listener).await
    }

    /// Create a new hosted node for the given network, from the seed.
    pub async fn register_node(
        network: Network,
        seed: &Seed,
        partner_credentials: Option<GreenlightCredentials>,
        invite_code: Option<String>,
    ) -> SdkResult<GreenlightCredentials> {
        let node_config = NodeConfig::greenlight(partner_credentials, invite_code)?;
        SdkBuilder::new(Config::production("", node_config).with_network(network))
            .register_node(seed)
            .await
    }

    /// Recover the device credentials of a previously registered node.
    pub async fn recover_node(network: Network, seed: &Seed) -> SdkResult<GreenlightCredentials> {
        SdkBuilder::new(Config::production("", NodeConfig::default()).with_network(network))
            .recover_node(seed)
            .await
    }

    /// Create the services for a node without starting them. Call [`Self::start`] next.
    pub async fn init_services(
        config: Config,
        seed: &Seed,
        creds: GreenlightCredentials,
        listener: Box<dyn EventListener>,
    ) -> SdkResult<Arc<BreezServices>> {
        SdkBuilder::new(config).build(seed, creds, listener)
    }

    /// Connect to the node and begin event delivery.
    pub async fn start(&self) -> SdkResult<()> {
        let guard = SessionGuard::acquire()?;
        self.start_with_guard(guard).await
    }

    pub(crate) async fn start_with_guard(&self, guard: SessionGuard) -> SdkResult<()> {
        let started = Instant::now();
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SdkError::AlreadyConnected);
        }

        self.node_api.start().await?;
        let node_events = self.node_api.subscribe().await?;
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let delivery = spawn_delivery(self.listener.clone(), node_events, local_rx, shutdown.subscribe());
        let delivery = watch_delivery(Arc::downgrade(&self.running), id, self.node_api.node_id(), delivery);

        *running = Some(Running { id, _guard: guard, shutdown, delivery, local_events: local_tx });
        tracing::info!(node_id = %self.node_api.node_id(), "SDK started in {:?}", started.elapsed());
        Ok(())
    }

    /// Stop event delivery and release the session. Later queries fail with
    /// [`SdkError::NotConnected`].
    pub async fn stop(&self) -> SdkResult<()> {
        let running = self.running.lock().await.take().ok_or(SdkError::NotConnected)?;
        running.shutdown.trigger();
        if let Err(e) = running.delivery.await {
            tracing::warn!("Event delivery task failed: {e}");
        }
        tracing::info!(node_id = %self.node_api.node_id(), "SDK stopped");
        Ok(())
    }

    pub async fn disconnect(&self) -> SdkResult<()> {
        self.stop().await
    }

    pub async fn is_connected(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Fresh node state from the backend.
    pub async fn node_info(&self) -> SdkResult<NodeState> {
        self.ensure_running().await?;
        Ok(self.node_api.node_state().await?)
    }

    /// Pull the node state and emit [`BreezEvent::Synced`] once done.
    pub async fn sync(&self) -> SdkResult<NodeState> {
        let events = self.ensure_running().await?;
        let state = self.node_api.node_state().await?;
        events.send(BreezEvent::Synced).map_err(|_| SdkError::NotConnected)?;
        Ok(state)
    }

    pub async fn sign_message(&self, message: &str) -> SdkResult<String> {
        self.ensure_running().await?;
        Ok(self.node_api.sign_message(message).await?)
    }

    /// Check a signature produced by [`Self::sign_message`] for `pubkey`.
    pub fn check_message(message: &str, pubkey: &str, signature: &str) -> bool {
        signer::check_message(message, pubkey, signature)
    }

    pub fn node_id(&self) -> String { self.node_api.node_id() }

    pub fn config(&self) -> &Config { &self.config }

    async fn ensure_running(&self) -> SdkResult<mpsc::UnboundedSender<BreezEvent>> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.local_events.clone())
            .ok_or(SdkError::NotConnected)
    }
}

/// Ends session `id` once its backend stream closes. Queries then fail with
/// [`SdkError::NotConnected`] and the process-wide guard is released.
fn watch_delivery(
    slot: Weak<Mutex<Option<Running>>>,
    id: u64,
    node_id: String,
    delivery: JoinHandle<DeliveryEnd>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match delivery.await {
            Ok(DeliveryEnd::Shutdown) => {}
            Ok(DeliveryEnd::StreamClosed) => {
                let Some(slot) = slot.upgrade() else { return };
                let mut running = slot.lock().await;
                // stop() may already have taken it, or a newer session may own the slot
                if running.as_ref().is_some_and(|r| r.id == id) {
                    running.take();
                    tracing::warn!(node_id = %node_id, "Session ended: node event stream closed");
                }
            }
            Err(e) => tracing::warn!("Event delivery task failed: {e}"),
        }
    })
}

impl Drop for BreezServices {
    fn drop(&mut self) {
        // Only the stream watcher can hold the lock here, and it is clearing the slot
        if let Ok(mut running) = self.running.try_lock() {
            if let Some(running) = running.take() {
                running.shutdown.trigger();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node_api::{NodeEvent, NodeResult};
    use async_trait::async_trait;
    use once_cell::sync::Lazy;
    use std::sync::atomic::AtomicUsize;

    pub(crate) static SESSION_LOCK: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

    pub(crate) fn lock_session() -> std::sync::MutexGuard<'static, ()> {
        SESSION_LOCK.lock().unwrap_or_else(|p| p.into_inner())
    }

    struct NoopListener;
    impl EventListener for NoopListener {
        fn on_event(&self, _e: BreezEvent) {}
    }

    /// Counts backend queries.
    #[derive(Default)]
    struct MockNodeApi {
        queries: AtomicUsize,
        events: std::sync::Mutex<Option<mpsc::UnboundedSender<NodeEvent>>>,
    }

    #[async_trait]
    impl NodeApi for MockNodeApi {
        fn node_id(&self) -> String { "02mock".into() }
        async fn start(&self) -> NodeResult<()> { Ok(()) }
        async fn node_state(&self) -> NodeResult<NodeState> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) as u32;
            Ok(NodeState { id: self.node_id(), block_height: n, ..Default::default() })
        }
        async fn subscribe(&self) -> NodeResult<mpsc::UnboundedReceiver<NodeEvent>> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock().unwrap() = Some(tx);
            Ok(rx)
        }
        async fn sign_message(&self, message: &str) -> NodeResult<String> { Ok(format!("sig:{message}")) }
    }

    fn services(api: Arc<MockNodeApi>) -> BreezServices {
        let config = default_config(EnvironmentType::Production, "", NodeConfig::default());
        BreezServices::new(config, api, Box::new(NoopListener))
    }

    #[tokio::test]
    async fn test_not_connected_before_start_and_after_stop() {
        let _lock = lock_session();
        let api = Arc::new(MockNodeApi::default());
        let sdk = services(api.clone());

        assert!(matches!(sdk.node_info().await, Err(SdkError::NotConnected)));
        assert!(matches!(sdk.stop().await, Err(SdkError::NotConnected)));
        assert_eq!(api.queries.load(Ordering::SeqCst), 0);

        sdk.start().await.unwrap();
        assert!(sdk.is_connected().await);
        sdk.stop().await.unwrap();
        assert!(matches!(sdk.node_info().await, Err(SdkError::NotConnected)));
        assert!(matches!(sdk.sign_message("x").await, Err(SdkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_node_info_is_fresh_query() {
        let _lock = lock_session();
        let api = Arc::new(MockNodeApi::default());
        let sdk = services(api.clone());
        sdk.start().await.unwrap();

        let first = sdk.node_info().await.unwrap();
        let second = sdk.node_info().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(api.queries.load(Ordering::SeqCst), 2);
        assert_ne!(first.block_height, second.block_height);
        sdk.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_session_per_process() {
        let _lock = lock_session();
        let first = services(Arc::new(MockNodeApi::default()));
        let second = services(Arc::new(MockNodeApi::default()));

        first.start().await.unwrap();
        assert!(matches!(first.start().await, Err(SdkError::AlreadyConnected)));
        assert!(matches!(second.start().await, Err(SdkError::AlreadyConnected)));

        first.stop().await.unwrap();
        second.start().await.unwrap();
        second.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_loss_ends_session() {
        let _lock = lock_session();
        let api = Arc::new(MockNodeApi::default());
        let sdk = services(api.clone());
        sdk.start().await.unwrap();

        api.events.lock().unwrap().take();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while sdk.is_connected().await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(sdk.node_info().await, Err(SdkError::NotConnected)));
        assert!(matches!(sdk.stop().await, Err(SdkError::NotConnected)));
        assert!(SessionGuard::acquire().is_ok());
    }

    #[tokio::test]
    async fn test_stream_loss_after_stop_leaves_new_session_alone() {
        let _lock = lock_session();
        let first_api = Arc::new(MockNodeApi::default());
        let first = services(first_api.clone());
        first.start().await.unwrap();
        first.stop().await.unwrap();
        first_api.events.lock().unwrap().take();

        let sdk = services(Arc::new(MockNodeApi::default()));
        sdk.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(sdk.is_connected().await);
        sdk.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_session() {
        let _lock = lock_session();
        let sdk = services(Arc::new(MockNodeApi::default()));
        sdk.start().await.unwrap();
        drop(sdk);

        let guard = SessionGuard::acquire();
        assert!(guard.is_ok());
    }
}
