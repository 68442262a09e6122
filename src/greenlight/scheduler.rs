//! EmbeddedScheduler - in-process hosted node backend.
//!
//! Keeps a registry of nodes keyed by (network, node id), issues device
//! credentials bound to the node by an HMAC certificate, and feeds each node's
//! subscribers with events in the order they are produced. Used as the default
//! backend and as the regtest-style backend in tests.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use rand::RngCore;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::models::{GreenlightCredentials, NodeState};
use crate::node_api::{
    ChallengeScope, NodeClient, NodeError, NodeEvent, NodeResult, RecoveryRequest,
    RegistrationRequest, Scheduler,
};
use crate::services::Network;
use crate::signer::verify_challenge;

static SHARED: Lazy<EmbeddedScheduler> = Lazy::new(EmbeddedScheduler::new);

type NodeKey = (Network, String);

#[derive(Clone)]
pub struct EmbeddedScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    secret: [u8; 32],
    invite_codes: Option<HashSet<String>>,
    offline: AtomicBool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    nodes: HashMap<NodeKey, HostedNode>,
    challenges: HashMap<NodeKey, (ChallengeScope, Vec<u8>)>,
    heights: HashMap<Network, u32>,
}

struct HostedNode {
    state: NodeState,
    subscribers: Vec<mpsc::UnboundedSender<NodeEvent>>,
}

impl HostedNode {
    fn emit(&mut self, event: NodeEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for EmbeddedScheduler {
    fn default() -> Self { Self::new() }
}

impl EmbeddedScheduler {
    /// Scheduler with open registration.
    pub fn new() -> Self { Self::build(None) }

    /// Scheduler that only registers nodes presenting one of `codes`
    /// (or partner credentials).
    pub fn with_invite_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(Some(codes.into_iter().map(Into::into).collect()))
    }

    /// Process-wide instance used when no scheduler is injected.
    pub fn shared() -> Self { SHARED.clone() }

    fn build(invite_codes: Option<HashSet<String>>) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            inner: Arc::new(Inner {
                secret,
                invite_codes,
                offline: AtomicBool::new(false),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Simulate the backend becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_registered(&self, network: Network, node_id: &str) -> bool {
        self.inner.lock().map(|s| s.nodes.contains_key(&(network, node_id.to_string()))).unwrap_or(false)
    }

    /// Advance the chain tip of `network`, notifying every node on it.
    pub fn mine_blocks(&self, network: Network, count: u32) -> NodeResult<u32> {
        let mut state = self.inner.lock()?;
        let mut height = state.heights.get(&network).copied().unwrap_or(0);
        for _ in 0..count {
            height += 1;
            for ((net, _), node) in state.nodes.iter_mut() {
                if *net == network {
                    node.state.block_height = height;
                    node.emit(NodeEvent::Block { height });
                }
            }
        }
        state.heights.insert(network, height);
        Ok(height)
    }

    /// Report an event from the node's side.
    pub fn push_event(&self, network: Network, node_id: &str, event: NodeEvent) -> NodeResult<()> {
        let mut state = self.inner.lock()?;
        let node = state
            .nodes
            .get_mut(&(network, node_id.to_string()))
            .ok_or_else(|| NodeError::NodeNotFound(node_id.to_string()))?;
        node.emit(event);
        Ok(())
    }

    /// Close every event stream of a node, as if its host went away.
    pub fn disconnect_node(&self, network: Network, node_id: &str) -> NodeResult<()> {
        let mut state = self.inner.lock()?;
        let node = state
            .nodes
            .get_mut(&(network, node_id.to_string()))
            .ok_or_else(|| NodeError::NodeNotFound(node_id.to_string()))?;
        node.subscribers.clear();
        Ok(())
    }
}

impl Inner {
    fn lock(&self) -> NodeResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| NodeError::Generic("scheduler lock".into()))
    }

    fn ensure_online(&self) -> NodeResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NodeError::Connection("scheduler unreachable".into()));
        }
        Ok(())
    }

    fn certificate(&self, key: &NodeKey, device_key: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(key.0.as_str().as_bytes());
        mac.update(key.1.as_bytes());
        mac.update(device_key);
        mac.finalize().into_bytes().to_vec()
    }

    fn issue(&self, key: &NodeKey) -> GreenlightCredentials {
        let mut device_key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut device_key);
        let device_cert = self.certificate(key, &device_key);
        GreenlightCredentials { device_key, device_cert }
    }

    fn verify_certificate(&self, key: &NodeKey, creds: &GreenlightCredentials) -> bool {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(key.0.as_str().as_bytes());
        mac.update(key.1.as_bytes());
        mac.update(&creds.device_key);
        mac.verify_slice(&creds.device_cert).is_ok()
    }

    fn take_challenge(
        state: &mut State,
        key: &NodeKey,
        scope: ChallengeScope,
        challenge: &[u8],
        signature: &[u8],
    ) -> NodeResult<()> {
        match state.challenges.remove(key) {
            Some((pending_scope, pending)) if pending_scope == scope && pending == challenge => {}
            _ => return Err(NodeError::Auth("unknown or expired challenge".into())),
        }
        if !verify_challenge(&key.1, challenge, signature) {
            return Err(NodeError::Auth("challenge signature invalid".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Scheduler for EmbeddedScheduler {
    async fn challenge(&self, node_id: &str, network: Network, scope: ChallengeScope) -> NodeResult<Vec<u8>> {
        self.inner.ensure_online()?;
        let mut challenge = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut challenge);
        self.inner
            .lock()?
            .challenges
            .insert((network, node_id.to_string()), (scope, challenge.clone()));
        Ok(challenge)
    }

    async fn register(&self, req: RegistrationRequest) -> NodeResult<GreenlightCredentials> {
        self.inner.ensure_online()?;
        let key = (req.network, req.node_id.clone());
        let mut state = self.inner.lock()?;
        Inner::take_challenge(&mut state, &key, ChallengeScope::Register, &req.challenge, &req.signature)?;

        if state.nodes.contains_key(&key) {
            return Err(NodeError::Generic(format!("node {} already registered", req.node_id)));
        }
        if let (None, Some(codes)) = (&req.partner_credentials, &self.inner.invite_codes) {
            let accepted = req.invite_code.as_deref().map(|c| codes.contains(c)).unwrap_or(false);
            if !accepted {
                return Err(NodeError::Auth("invite code required".into()));
            }
        }

        let block_height = state.heights.get(&req.network).copied().unwrap_or(0);
        state.nodes.insert(
            key.clone(),
            HostedNode {
                state: NodeState { id: req.node_id.clone(), block_height, ..Default::default() },
                subscribers: Vec::new(),
            },
        );
        tracing::debug!(node_id = %req.node_id, "Embedded scheduler registered node");
        Ok(self.inner.issue(&key))
    }

    async fn recover(&self, req: RecoveryRequest) -> NodeResult<GreenlightCredentials> {
        self.inner.ensure_online()?;
        let key = (req.network, req.node_id.clone());
        let mut state = self.inner.lock()?;
        if !state.nodes.contains_key(&key) {
            state.challenges.remove(&key);
            return Err(NodeError::NodeNotFound(req.node_id));
        }
        Inner::take_challenge(&mut state, &key, ChallengeScope::Recover, &req.challenge, &req.signature)?;
        Ok(self.inner.issue(&key))
    }

    async fn schedule(
        &self,
        node_id: &str,
        network: Network,
        creds: &GreenlightCredentials,
    ) -> NodeResult<Arc<dyn NodeClient>> {
        self.inner.ensure_online()?;
        let key = (network, node_id.to_string());
        if !self.inner.lock()?.nodes.contains_key(&key) {
            return Err(NodeError::NodeNotFound(node_id.to_string()));
        }
        if !self.inner.verify_certificate(&key, creds) {
            return Err(NodeError::Auth("device certificate rejected".into()));
        }
        Ok(Arc::new(EmbeddedNodeClient { inner: self.inner.clone(), key }))
    }
}

struct EmbeddedNodeClient {
    inner: Arc<Inner>,
    key: NodeKey,
}

#[async_trait]
impl NodeClient for EmbeddedNodeClient {
    async fn get_info(&self) -> NodeResult<NodeState> {
        self.inner.ensure_online()?;
        let state = self.inner.lock()?;
        state
            .nodes
            .get(&self.key)
            .map(|node| node.state.clone())
            .ok_or_else(|| NodeError::NodeNotFound(self.key.1.clone()))
    }

    async fn stream_events(&self) -> NodeResult<mpsc::UnboundedReceiver<NodeEvent>> {
        self.inner.ensure_online()?;
        let mut state = self.inner.lock()?;
        let node = state
            .nodes
            .get_mut(&self.key)
            .ok_or_else(|| NodeError::NodeNotFound(self.key.1.clone()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        node.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::mnemonic_to_seed;
    use crate::signer::NodeSigner;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    async fn register(scheduler: &EmbeddedScheduler, invite_code: Option<String>) -> NodeResult<(String, GreenlightCredentials)> {
        let signer = NodeSigner::new(&mnemonic_to_seed(TEST_MNEMONIC).unwrap()).unwrap();
        let node_id = signer.node_id_hex();
        let challenge = scheduler.challenge(&node_id, Network::Regtest, ChallengeScope::Register).await?;
        let signature = signer.sign_challenge(&challenge);
        let creds = scheduler
            .register(RegistrationRequest {
                node_id: node_id.clone(),
                network: Network::Regtest,
                challenge,
                signature,
                partner_credentials: None,
                invite_code,
            })
            .await?;
        Ok((node_id, creds))
    }

    #[tokio::test]
    async fn test_invite_code_policy() {
        let scheduler = EmbeddedScheduler::with_invite_codes(["abc"]);
        assert!(matches!(register(&scheduler, None).await, Err(NodeError::Auth(_))));
        assert!(matches!(register(&scheduler, Some("nope".into())).await, Err(NodeError::Auth(_))));
        assert!(register(&scheduler, Some("abc".into())).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let scheduler = EmbeddedScheduler::new();
        let node_id = NodeSigner::new(&mnemonic_to_seed(TEST_MNEMONIC).unwrap()).unwrap().node_id_hex();
        let challenge = scheduler.challenge(&node_id, Network::Regtest, ChallengeScope::Register).await.unwrap();
        let res = scheduler
            .register(RegistrationRequest {
                node_id,
                network: Network::Regtest,
                challenge,
                signature: vec![0; 64],
                partner_credentials: None,
                invite_code: None,
            })
            .await;
        assert!(matches!(res, Err(NodeError::Auth(_))));
    }

    #[tokio::test]
    async fn test_events_in_order_and_blocks() {
        let scheduler = EmbeddedScheduler::new();
        let (node_id, creds) = register(&scheduler, None).await.unwrap();
        let client = scheduler.schedule(&node_id, Network::Regtest, &creds).await.unwrap();
        let mut rx = client.stream_events().await.unwrap();

        assert_eq!(scheduler.mine_blocks(Network::Regtest, 3).unwrap(), 3);
        for height in 1..=3 {
            assert_eq!(rx.recv().await, Some(NodeEvent::Block { height }));
        }
        assert_eq!(client.get_info().await.unwrap().block_height, 3);

        scheduler.disconnect_node(Network::Regtest, &node_id).unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_offline_is_connection_error() {
        let scheduler = EmbeddedScheduler::new();
        scheduler.set_offline(true);
        assert!(matches!(register(&scheduler, None).await, Err(NodeError::Connection(_))));
        scheduler.set_offline(false);
        assert!(register(&scheduler, None).await.is_ok());
    }
}
