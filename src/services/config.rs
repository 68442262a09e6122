//! SDK Configuration - constructed by the embedding layer

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{SdkError, SdkResult};
use crate::models::GreenlightCredentials;

const PRODUCTION_BREEZSERVER: &str = "https://bs1.breez.technology:443";
const STAGING_BREEZSERVER: &str = "https://bs1-st.breez.technology:443";
const MEMPOOLSPACE_URL: &str = "https://mempool.space";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    #[default]
    Production,
    Staging,
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Production => "production",
            EnvironmentType::Staging => "staging",
        }
    }
}

impl FromStr for EnvironmentType {
    type Err = SdkError;

    fn from_str(value: &str) -> SdkResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(EnvironmentType::Production),
            "staging" | "stage" => Ok(EnvironmentType::Staging),
            _ => Err(SdkError::InvalidConfig(format!("unknown environment: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Bitcoin,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }
}

impl FromStr for Network {
    type Err = SdkError;

    fn from_str(value: &str) -> SdkResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(SdkError::InvalidConfig(format!("unknown network: {value}"))),
        }
    }
}

/// Greenlight-style hosted node settings.
///
/// Registration authenticates either with partner credentials or with an invite
/// code, never both. Supplying neither is allowed; the backend decides whether it
/// accepts open registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenlightNodeConfig {
    pub partner_credentials: Option<GreenlightCredentials>,
    pub invite_code: Option<String>,
}

impl GreenlightNodeConfig {
    /// Validating constructor. An empty invite code counts as no invite code.
    pub fn new(
        partner_credentials: Option<GreenlightCredentials>,
        invite_code: Option<String>,
    ) -> SdkResult<Self> {
        let config = Self { partner_credentials, invite_code: normalize_code(invite_code) };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SdkResult<()> {
        let has_code = self.invite_code.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false);
        if self.partner_credentials.is_some() && has_code {
            return Err(SdkError::InvalidConfig(
                "partner credentials and invite code are mutually exclusive".into(),
            ));
        }
        if let Some(creds) = &self.partner_credentials {
            if creds.device_key.is_empty() || creds.device_cert.is_empty() {
                return Err(SdkError::InvalidConfig("partner credentials are incomplete".into()));
            }
        }
        Ok(())
    }

    /// Invite code to present at registration, if any.
    pub fn registration_code(&self) -> Option<&str> {
        self.invite_code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

fn normalize_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

/// Backend kinds a session can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeConfig {
    Greenlight { config: GreenlightNodeConfig },
}

impl NodeConfig {
    pub fn greenlight(
        partner_credentials: Option<GreenlightCredentials>,
        invite_code: Option<String>,
    ) -> SdkResult<Self> {
        Ok(NodeConfig::Greenlight { config: GreenlightNodeConfig::new(partner_credentials, invite_code)? })
    }

    pub fn validate(&self) -> SdkResult<()> {
        match self {
            NodeConfig::Greenlight { config } => config.validate(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig::Greenlight { config: GreenlightNodeConfig::default() }
    }
}

/// SDK configuration. Higher layers construct this, usually via [`default_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub breezserver: String,
    pub mempoolspace_url: String,
    /// Directory where per-node credentials are stored.
    pub working_dir: String,
    pub network: Network,
    pub payment_timeout_sec: u32,
    pub default_lsp_id: Option<String>,
    pub api_key: Option<String>,
    pub maxfee_percent: f64,
    pub exemptfee_msat: u64,
    pub node_config: NodeConfig,
}

impl Config {
    pub fn production(api_key: impl Into<String>, node_config: NodeConfig) -> Self {
        Self {
            breezserver: PRODUCTION_BREEZSERVER.into(),
            mempoolspace_url: MEMPOOLSPACE_URL.into(),
            working_dir: ".".into(),
            network: Network::Bitcoin,
            payment_timeout_sec: 60,
            default_lsp_id: None,
            api_key: normalize_code(Some(api_key.into())),
            maxfee_percent: 1.0,
            exemptfee_msat: 20_000,
            node_config,
        }
    }

    pub fn staging(api_key: impl Into<String>, node_config: NodeConfig) -> Self {
        Self { breezserver: STAGING_BREEZSERVER.into(), ..Self::production(api_key, node_config) }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = normalize_code(Some(key.into()));
        self
    }

    pub fn with_default_lsp(mut self, id: impl Into<String>) -> Self {
        self.default_lsp_id = Some(id.into());
        self
    }

    pub fn with_payment_timeout(mut self, secs: u32) -> Self {
        self.payment_timeout_sec = secs;
        self
    }

    pub fn with_maxfee_percent(mut self, percent: f64) -> Self {
        self.maxfee_percent = percent;
        self
    }

    pub fn validate(&self) -> SdkResult<()> {
        self.node_config.validate()?;
        if !self.maxfee_percent.is_finite() || self.maxfee_percent < 0.0 {
            return Err(SdkError::InvalidConfig(format!(
                "maxfee_percent out of range: {}",
                self.maxfee_percent
            )));
        }
        if self.payment_timeout_sec == 0 {
            return Err(SdkError::InvalidConfig("payment_timeout_sec must be positive".into()));
        }
        if self.working_dir.trim().is_empty() {
            return Err(SdkError::InvalidConfig("working_dir is empty".into()));
        }
        Ok(())
    }
}

/// Build the default config for an environment. Pure, no I/O.
pub fn default_config(env_type: EnvironmentType, api_key: impl Into<String>, node_config: NodeConfig) -> Config {
    match env_type {
        EnvironmentType::Production => Config::production(api_key, node_config),
        EnvironmentType::Staging => Config::staging(api_key, node_config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner() -> GreenlightCredentials {
        GreenlightCredentials { device_key: vec![1; 32], device_cert: vec![2; 32] }
    }

    #[test]
    fn test_credential_combinations() {
        assert!(GreenlightNodeConfig::new(None, None).is_ok());
        assert!(GreenlightNodeConfig::new(None, Some("code".into())).is_ok());
        assert!(GreenlightNodeConfig::new(Some(partner()), None).is_ok());
        assert!(matches!(
            GreenlightNodeConfig::new(Some(partner()), Some("code".into())),
            Err(SdkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_invite_code_is_none() {
        let config = GreenlightNodeConfig::new(None, Some("  ".into())).unwrap();
        assert_eq!(config.invite_code, None);
        // Empty code next to partner credentials is not a conflict
        assert!(GreenlightNodeConfig::new(Some(partner()), Some(String::new())).is_ok());
    }

    #[test]
    fn test_default_config_environments() {
        let prod = default_config(EnvironmentType::Production, "code", NodeConfig::default());
        let staging = default_config(EnvironmentType::Staging, "code", NodeConfig::default());
        assert_eq!(prod.breezserver, PRODUCTION_BREEZSERVER);
        assert_eq!(staging.breezserver, STAGING_BREEZSERVER);
        assert_eq!(prod.network, Network::Bitcoin);
        assert_eq!(prod.api_key.as_deref(), Some("code"));
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = default_config(EnvironmentType::Production, "", NodeConfig::default());
        assert_eq!(config.api_key, None);
        assert!(config.clone().with_maxfee_percent(-1.0).validate().is_err());
        assert!(config.clone().with_payment_timeout(0).validate().is_err());
        assert!(config.with_working_dir("").validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let node_config = NodeConfig::greenlight(None, Some("invite".into())).unwrap();
        let config = default_config(EnvironmentType::Staging, "key", node_config);
        let raw = serde_json::to_string(&config).unwrap();
        assert!(raw.contains("\"type\":\"greenlight\""));
        let back: Config = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_network_parse() {
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Bitcoin);
        assert_eq!(" regtest ".parse::<Network>().unwrap(), Network::Regtest);
        assert!(matches!("litecoin".parse::<Network>(), Err(SdkError::InvalidConfig(_))));
        for network in [Network::Bitcoin, Network::Testnet, Network::Signet, Network::Regtest] {
            assert_eq!(network.as_str().parse::<Network>().unwrap(), network);
        }
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("Staging".parse::<EnvironmentType>().unwrap(), EnvironmentType::Staging);
        assert_eq!("prod".parse::<EnvironmentType>().unwrap(), EnvironmentType::Production);
        assert!(matches!("nope".parse::<EnvironmentType>(), Err(SdkError::InvalidConfig(_))));
    }
}
