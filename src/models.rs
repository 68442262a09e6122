//! Value types crossing the SDK boundary.

use serde::{Deserialize, Serialize};

use crate::seed::Seed;
use crate::services::Config;

/// Device credentials for a hosted node. Recoverable from (network, seed).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenlightCredentials {
    #[serde(with = "hex")]
    pub device_key: Vec<u8>,
    #[serde(with = "hex")]
    pub device_cert: Vec<u8>,
}

impl std::fmt::Debug for GreenlightCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreenlightCredentials")
            .field("device_key", &"<redacted>")
            .field("device_cert", &hex::encode(&self.device_cert))
            .finish()
    }
}

/// Everything `connect` needs. Consumed by the connection attempt.
#[derive(Debug)]
pub struct ConnectRequest {
    pub config: Config,
    pub seed: Seed,
}

impl ConnectRequest {
    pub fn new(config: Config, seed: Seed) -> Self { Self { config, seed } }
}

/// Snapshot of the node's identity and state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,
    pub block_height: u32,
    pub channels_balance_msat: u64,
    pub onchain_balance_msat: u64,
    pub max_payable_msat: u64,
    pub max_receivable_msat: u64,
    pub connected_peers: Vec<String>,
    pub inbound_liquidity_msats: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType { Sent, Received }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub payment_type: PaymentType,
    pub payment_time: i64,
    pub amount_msat: u64,
    pub fee_msat: u64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaidDetails {
    pub payment_hash: String,
    pub bolt11: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub error: String,
    pub node_id: String,
    pub bolt11: Option<String>,
}

/// Event delivered to the session's [`crate::EventListener`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreezEvent {
    /// A new block was found
    NewBlock { block: u32 },
    /// An invoice issued by this node was paid
    InvoicePaid { details: InvoicePaidDetails },
    /// Local state was synced with the node
    Synced,
    /// An outgoing payment completed
    PaymentSucceed { details: Payment },
    /// An outgoing payment failed
    PaymentFailed { details: PaymentFailedData },
    /// The backend event stream ended; no further events follow
    Disconnected { reason: String },
}
