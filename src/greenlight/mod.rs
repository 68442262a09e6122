//! Greenlight-style hosted node backend.
//!
//! The node runs remotely; the signer stays local. Registration and recovery are
//! challenge-response exchanges with the scheduler, signed with the node key, and
//! yield device credentials. With those credentials the scheduler hands out a
//! [`NodeClient`] for the node.
//!
//! ```text
//! Greenlight (NodeApi)
//!     │
//!     ├── NodeSigner (seed → node key, local)
//!     │
//!     └── Scheduler ── register / recover → GreenlightCredentials
//!              │
//!              └── schedule(creds) → NodeClient (get_info, stream_events)
//! ```

pub mod scheduler;

pub use scheduler::EmbeddedScheduler;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::models::{GreenlightCredentials, NodeState};
use crate::node_api::{
    ChallengeScope, NodeApi, NodeClient, NodeEvent, NodeResult, RecoveryRequest,
    RegistrationRequest, Scheduler,
};
use crate::seed::Seed;
use crate::services::Network;
use crate::signer::NodeSigner;

pub struct Greenlight {
    network: Network,
    signer: NodeSigner,
    creds: GreenlightCredentials,
    scheduler: Arc<dyn Scheduler>,
    client: Mutex<Option<Arc<dyn NodeClient>>>,
}

impl Greenlight {
    pub fn new(
        network: Network,
        seed: &Seed,
        creds: GreenlightCredentials,
        scheduler: Arc<dyn Scheduler>,
    ) -> NodeResult<Self> {
        Ok(Self { network, signer: NodeSigner::new(seed)?, creds, scheduler, client: Mutex::new(None) })
    }

    /// Create a new node for the given network from the seed.
    pub async fn register(
        scheduler: &dyn Scheduler,
        network: Network,
        seed: &Seed,
        partner_credentials: Option<GreenlightCredentials>,
        invite_code: Option<String>,
    ) -> NodeResult<GreenlightCredentials> {
        let signer = NodeSigner::new(seed)?;
        let node_id = signer.node_id_hex();
        let challenge = scheduler.challenge(&node_id, network, ChallengeScope::Register).await?;
        let signature = signer.sign_challenge(&challenge);
        tracing::info!(node_id = %node_id, network = network.as_str(), "Registering node");
        scheduler
            .register(RegistrationRequest { node_id, network, challenge, signature, partner_credentials, invite_code })
            .await
    }

    /// Recover credentials for a previously registered node.
    pub async fn recover(scheduler: &dyn Scheduler, network: Network, seed: &Seed) -> NodeResult<GreenlightCredentials> {
        let signer = NodeSigner::new(seed)?;
        let node_id = signer.node_id_hex();
        let challenge = scheduler.challenge(&node_id, network, ChallengeScope::Recover).await?;
        let signature = signer.sign_challenge(&challenge);
        tracing::info!(node_id = %node_id, network = network.as_str(), "Recovering node");
        scheduler.recover(RecoveryRequest { node_id, network, challenge, signature }).await
    }

    async fn client(&self) -> NodeResult<Arc<dyn NodeClient>> {
        let mut existing = self.client.lock().await;
        if let Some(client) = existing.as_ref() {
            return Ok(client.clone());
        }
        let client = self.scheduler.schedule(&self.signer.node_id_hex(), self.network, &self.creds).await?;
        *existing = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl NodeApi for Greenlight {
    fn node_id(&self) -> String { self.signer.node_id_hex() }

    async fn start(&self) -> NodeResult<()> {
        let client = self.client().await?;
        let state = client.get_info().await?;
        tracing::debug!(node_id = %state.id, block_height = state.block_height, "Node scheduled");
        Ok(())
    }

    async fn node_state(&self) -> NodeResult<NodeState> {
        self.client().await?.get_info().await
    }

    async fn subscribe(&self) -> NodeResult<mpsc::UnboundedReceiver<NodeEvent>> {
        self.client().await?.stream_events().await
    }

    async fn sign_message(&self, message: &str) -> NodeResult<String> {
        Ok(self.signer.sign_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_api::NodeError;
    use crate::seed::mnemonic_to_seed;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[tokio::test]
    async fn test_register_then_recover() {
        let scheduler = EmbeddedScheduler::new();
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();

        let unknown = Greenlight::recover(&scheduler, Network::Regtest, &seed).await;
        assert!(matches!(unknown, Err(NodeError::NodeNotFound(_))));

        let registered = Greenlight::register(&scheduler, Network::Regtest, &seed, None, None).await.unwrap();
        let recovered = Greenlight::recover(&scheduler, Network::Regtest, &seed).await.unwrap();
        assert_eq!(registered.device_key.len(), 32);
        assert_ne!(registered.device_key, recovered.device_key);

        // Both device credentials are accepted
        for creds in [registered, recovered] {
            let gl = Greenlight::new(Network::Regtest, &seed, creds, Arc::new(scheduler.clone())).unwrap();
            gl.start().await.unwrap();
            assert_eq!(gl.node_state().await.unwrap().id, gl.node_id());
        }
    }

    #[tokio::test]
    async fn test_forged_credentials_rejected() {
        let scheduler = EmbeddedScheduler::new();
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        Greenlight::register(&scheduler, Network::Bitcoin, &seed, None, None).await.unwrap();

        let forged = GreenlightCredentials { device_key: vec![7; 32], device_cert: vec![9; 32] };
        let gl = Greenlight::new(Network::Bitcoin, &seed, forged, Arc::new(scheduler)).unwrap();
        assert!(matches!(gl.start().await, Err(NodeError::Auth(_))));
    }
}
