//! breez-sdk-core: session core of a Lightning node SDK.
//!
//! A seed phrase becomes a node identity; the identity is registered with (or
//! recovered from) a hosted-node scheduler; the resulting session reports node
//! state on demand and pushes node events to a caller-supplied listener.
//!
//! # Architecture
//!
//! ```text
//! BreezServices (session, one per process)
//!   │
//!   ├── Config / NodeConfig::Greenlight (validated)
//!   │
//!   ├── NodeApi ── Greenlight
//!   │                ├── NodeSigner (seed → HKDF → secp256k1 node key)
//!   │                └── Scheduler (EmbeddedScheduler by default)
//!   │
//!   ├── CredentialStore (working_dir/<network>/<node_id>/credentials.json, AES-GCM)
//!   │
//!   └── delivery task: node events → EventListener::on_event
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | seed | `mnemonic_to_seed(phrase)` | BIP39 phrase to 64-byte seed |
//! | config | `default_config(env, api_key, node_config)` | Environment defaults |
//! | connect | `BreezServices::connect(req, listener)` | Resolve credentials, start |
//! | recover | `BreezServices::recover_node(network, seed)` | Device credentials |
//! | init | `BreezServices::init_services(..)` + `start()` | Two-step connect |
//! | query | `services.node_info()` | Fresh node state |
//! | stop | `services.stop()` | End delivery, release session |
//!
//! # Usage
//!
//! ```ignore
//! use breez_sdk_core::*;
//!
//! let seed = mnemonic_to_seed("repeat hawk combine ...")?;
//! let config = default_config(EnvironmentType::Production, "", NodeConfig::greenlight(None, None)?);
//! let sdk = BreezServices::connect(ConnectRequest::new(config, seed), Box::new(MyListener)).await?;
//! println!("{}", sdk.node_info().await?.id);
//! ```

pub mod binding;
pub mod error;
pub mod events;
pub mod greenlight;
pub mod logging;
pub mod models;
pub mod node_api;
pub mod persist;
pub mod runtime;
pub mod seed;
pub mod services;
pub mod signer;

pub use error::{SdkError, SdkResult};
pub use events::EventListener;
pub use greenlight::{EmbeddedScheduler, Greenlight};
pub use models::{
    BreezEvent, ConnectRequest, GreenlightCredentials, InvoicePaidDetails, NodeState, Payment,
    PaymentFailedData, PaymentType,
};
pub use node_api::{NodeApi, NodeClient, NodeError, NodeEvent, Scheduler};
pub use persist::CredentialStore;
pub use runtime::{install_signal_handlers, Shutdown};
pub use seed::{derive_seed, generate_mnemonic, mnemonic_to_seed, Seed};
pub use services::{
    default_config, BreezServices, Config, EnvironmentType, GreenlightNodeConfig, Network, NodeConfig,
    SdkBuilder,
};
