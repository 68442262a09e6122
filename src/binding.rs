//! Blocking facade for hosts without an async runtime (FFI layers, CLIs).
//!
//! Every call runs on one process-wide multi-threaded runtime, created on first
//! use. Event delivery runs on that runtime's workers. Do not call these
//! functions from inside another tokio runtime.

use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::error::{SdkError, SdkResult};
use crate::events::EventListener;
use crate::models::{ConnectRequest, GreenlightCredentials, NodeState};
use crate::seed::Seed;
use crate::services::{self, BreezServices, Config, EnvironmentType, Network, NodeConfig};

static RT: OnceCell<Runtime> = OnceCell::new();

fn rt() -> SdkResult<&'static Runtime> {
    RT.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("breez-sdk")
            .build()
            .map_err(|e| SdkError::Generic(format!("failed to start runtime: {e}")))
    })
}

fn block_on<F: Future>(future: F) -> SdkResult<F::Output> {
    Ok(rt()?.block_on(future))
}

/// See [`crate::mnemonic_to_seed`]
pub fn mnemonic_to_seed(phrase: String) -> SdkResult<Seed> {
    crate::seed::mnemonic_to_seed(&phrase)
}

/// See [`services::default_config`]
pub fn default_config(env_type: EnvironmentType, api_key: String, node_config: NodeConfig) -> Config {
    services::default_config(env_type, api_key, node_config)
}

/// See [`BreezServices::connect`]
pub fn connect(req: ConnectRequest, listener: Box<dyn EventListener>) -> SdkResult<BlockingBreezServices> {
    let inner = block_on(BreezServices::connect(req, listener))??;
    Ok(BlockingBreezServices { inner })
}

/// See [`BreezServices::recover_node`]
pub fn recover_node(network: Network, seed: &Seed) -> SdkResult<GreenlightCredentials> {
    block_on(BreezServices::recover_node(network, seed))?
}

/// See [`BreezServices::register_node`]
pub fn register_node(
    network: Network,
    seed: &Seed,
    partner_credentials: Option<GreenlightCredentials>,
    invite_code: Option<String>,
) -> SdkResult<GreenlightCredentials> {
    block_on(BreezServices::register_node(network, seed, partner_credentials, invite_code))?
}

/// See [`BreezServices::init_services`]
pub fn init_services(
    config: Config,
    seed: &Seed,
    creds: GreenlightCredentials,
    listener: Box<dyn EventListener>,
) -> SdkResult<BlockingBreezServices> {
    let inner = block_on(BreezServices::init_services(config, seed, creds, listener))??;
    Ok(BlockingBreezServices { inner })
}

/// Blocking handle to a session.
#[derive(Clone)]
pub struct BlockingBreezServices {
    inner: Arc<BreezServices>,
}

impl BlockingBreezServices {
    pub fn start(&self) -> SdkResult<()> { block_on(self.inner.start())? }

    pub fn stop(&self) -> SdkResult<()> { block_on(self.inner.stop())? }

    pub fn node_info(&self) -> SdkResult<NodeState> { block_on(self.inner.node_info())? }

    pub fn sync(&self) -> SdkResult<NodeState> { block_on(self.inner.sync())? }

    pub fn sign_message(&self, message: &str) -> SdkResult<String> {
        block_on(self.inner.sign_message(message))?
    }

    pub fn check_message(&self, message: &str, pubkey: &str, signature: &str) -> bool {
        BreezServices::check_message(message, pubkey, signature)
    }

    pub fn node_id(&self) -> String { self.inner.node_id() }

    /// The async handle behind this one.
    pub fn services(&self) -> Arc<BreezServices> { self.inner.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BreezEvent;
    use crate::services::tests::lock_session;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    const MNEMONIC: &str =
        "repeat hawk combine screen network rhythm ritual social neither casual volcano powder";
    const NODE_ID: &str = "027e2b899f9f75b92a1ad210da21d74e7314e3499375213a71c6bf3e1b4b4394a1";

    struct ChannelListener(std::sync::Mutex<mpsc::Sender<BreezEvent>>);

    impl EventListener for ChannelListener {
        fn on_event(&self, e: BreezEvent) {
            let _ = self.0.lock().unwrap().send(e);
        }
    }

    #[test]
    fn test_blocking_session_lifecycle() {
        let _lock = lock_session();
        let dir = TempDir::new().expect("tempdir");
        let config = default_config(EnvironmentType::Staging, String::new(), NodeConfig::default())
            .with_network(Network::Regtest)
            .with_working_dir(dir.path().to_string_lossy());
        let seed = mnemonic_to_seed(MNEMONIC.to_string()).unwrap();
        let (tx, rx) = mpsc::channel();

        let sdk = connect(ConnectRequest::new(config, seed), Box::new(ChannelListener(tx.into()))).unwrap();
        assert_eq!(sdk.node_id(), NODE_ID);
        assert_eq!(sdk.node_info().unwrap().id, NODE_ID);

        sdk.sync().unwrap();
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event, BreezEvent::Synced);

        let signature = sdk.sign_message("hello").unwrap();
        assert!(sdk.check_message("hello", NODE_ID, &signature));

        sdk.stop().unwrap();
        assert!(matches!(sdk.node_info(), Err(SdkError::NotConnected)));
    }

    #[test]
    fn test_init_then_start() {
        let _lock = lock_session();
        let seed = mnemonic_to_seed(MNEMONIC.to_string()).unwrap();
        let creds = match recover_node(Network::Signet, &seed) {
            Ok(creds) => creds,
            Err(_) => register_node(Network::Signet, &seed, None, None).unwrap(),
        };
        let config = default_config(EnvironmentType::Production, String::new(), NodeConfig::default())
            .with_network(Network::Signet);
        let (tx, _rx) = mpsc::channel();

        let sdk = init_services(config, &seed, creds, Box::new(ChannelListener(tx.into()))).unwrap();
        assert!(matches!(sdk.node_info(), Err(SdkError::NotConnected)));
        sdk.start().unwrap();
        assert_eq!(sdk.node_info().unwrap().id, NODE_ID);
        sdk.stop().unwrap();
    }
}
