//! Backend seams: the hosted-node scheduler and the scheduled node connection.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::{GreenlightCredentials, InvoicePaidDetails, NodeState, Payment, PaymentFailedData};
use crate::services::Network;

pub type NodeResult<T, E = NodeError> = Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("Service connectivity: {0}")]
    Connection(String),
    #[error("Authentication rejected: {0}")]
    Auth(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Generic: {0}")]
    Generic(String),
}

/// Event reported by a running node, in the order the node produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Block { height: u32 },
    InvoicePaid(InvoicePaidDetails),
    PaymentSucceeded(Payment),
    PaymentFailed(PaymentFailedData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeScope { Register, Recover }

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub node_id: String,
    pub network: Network,
    pub challenge: Vec<u8>,
    pub signature: Vec<u8>,
    pub partner_credentials: Option<GreenlightCredentials>,
    pub invite_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    pub node_id: String,
    pub network: Network,
    pub challenge: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Hosted-node scheduler: registers nodes, issues device credentials, schedules
/// a node and hands back a connection to it.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn challenge(&self, node_id: &str, network: Network, scope: ChallengeScope) -> NodeResult<Vec<u8>>;
    async fn register(&self, req: RegistrationRequest) -> NodeResult<GreenlightCredentials>;
    async fn recover(&self, req: RecoveryRequest) -> NodeResult<GreenlightCredentials>;
    async fn schedule(
        &self,
        node_id: &str,
        network: Network,
        creds: &GreenlightCredentials,
    ) -> NodeResult<Arc<dyn NodeClient>>;
}

/// Authenticated connection to a scheduled node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_info(&self) -> NodeResult<NodeState>;
    /// Ordered stream of node events. The stream ends when the node goes away.
    async fn stream_events(&self) -> NodeResult<mpsc::UnboundedReceiver<NodeEvent>>;
}

/// What a session needs from its node backend.
#[async_trait]
pub trait NodeApi: Send + Sync {
    fn node_id(&self) -> String;
    /// Connect to the node. Called once when the session starts.
    async fn start(&self) -> NodeResult<()>;
    async fn node_state(&self) -> NodeResult<NodeState>;
    async fn subscribe(&self) -> NodeResult<mpsc::UnboundedReceiver<NodeEvent>>;
    async fn sign_message(&self, message: &str) -> NodeResult<String>;
}
