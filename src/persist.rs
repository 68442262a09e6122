//! Credential persistence - one encrypted JSON file per node under the working dir.
//!
//! The device credentials are sealed with AES-256-GCM under a key derived from the
//! seed (HKDF-SHA256, info `"credentials"`), with the node id as associated data.
//! A file written for one seed cannot be read with another.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::error::{SdkError, SdkResult};
use crate::models::GreenlightCredentials;
use crate::seed::Seed;
use crate::services::Network;
use crate::signer::{hkdf_sha256, NodeSigner};

const CREDENTIALS_FILE: &str = "credentials.json";
const CREDENTIALS_KEY_INFO: &[u8] = b"credentials";
const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialsFile {
    node_id: String,
    network: Network,
    #[serde(with = "hex")]
    nonce: Vec<u8>,
    #[serde(with = "hex")]
    ciphertext: Vec<u8>,
}

pub struct CredentialStore {
    path: PathBuf,
    node_id: String,
    network: Network,
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("node_id", &self.node_id)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Store for the node derived from `seed`, at
    /// `working_dir/<network>/<node_id>/credentials.json`.
    pub fn new(working_dir: impl AsRef<Path>, network: Network, seed: &Seed) -> SdkResult<Self> {
        let node_id = NodeSigner::new(seed)?.node_id_hex();
        let path = working_dir.as_ref().join(network.as_str()).join(&node_id).join(CREDENTIALS_FILE);
        let key = Zeroizing::new(hkdf_sha256(seed.as_bytes(), &[], CREDENTIALS_KEY_INFO));
        Ok(Self { path, node_id, network, key })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn node_id(&self) -> &str { &self.node_id }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]))
    }

    /// Stored credentials, if any. A file recorded for another node is ignored;
    /// one that does not decrypt under this seed is an error.
    pub fn load(&self) -> SdkResult<Option<GreenlightCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let file: CredentialsFile = serde_json::from_str(&raw)?;
        if file.node_id != self.node_id || file.network != self.network {
            tracing::warn!(path = %self.path.display(), "Credentials file belongs to another node");
            return Ok(None);
        }
        if file.nonce.len() != NONCE_LEN {
            return Err(SdkError::Persistence(format!("bad nonce length {}", file.nonce.len())));
        }

        let payload = Payload { msg: &file.ciphertext, aad: self.node_id.as_bytes() };
        let plaintext = Zeroizing::new(
            self.cipher()
                .decrypt(Nonce::from_slice(&file.nonce), payload)
                .map_err(|_| SdkError::Persistence("credentials do not match this seed".into()))?,
        );
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    pub fn save(&self, credentials: &GreenlightCredentials) -> SdkResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let plaintext = Zeroizing::new(serde_json::to_vec(credentials)?);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let payload = Payload { msg: plaintext.as_slice(), aad: self.node_id.as_bytes() };
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, payload)
            .map_err(|_| SdkError::Persistence("failed to encrypt credentials".into()))?;

        let file = CredentialsFile {
            node_id: self.node_id.clone(),
            network: self.network,
            nonce: nonce.to_vec(),
            ciphertext,
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> SdkResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::mnemonic_to_seed;
    use tempfile::TempDir;

    const MNEMONIC: &str =
        "repeat hawk combine screen network rhythm ritual social neither casual volcano powder";
    const OTHER_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const NODE: &str = "027e2b899f9f75b92a1ad210da21d74e7314e3499375213a71c6bf3e1b4b4394a1";

    fn creds() -> GreenlightCredentials {
        GreenlightCredentials { device_key: vec![1; 32], device_cert: vec![2; 32] }
    }

    fn store(dir: &TempDir, network: Network, mnemonic: &str) -> CredentialStore {
        CredentialStore::new(dir.path(), network, &mnemonic_to_seed(mnemonic).unwrap()).unwrap()
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Network::Bitcoin, MNEMONIC);
        assert_eq!(store.node_id(), NODE);
        assert!(store.load().unwrap().is_none());

        store.save(&creds()).unwrap();
        assert!(store.path().starts_with(dir.path().join("bitcoin").join(NODE)));
        assert_eq!(store.load().unwrap(), Some(creds()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_is_not_plaintext() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Network::Bitcoin, MNEMONIC);
        store.save(&creds()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("device_key"));
        assert!(!raw.contains(&hex::encode(creds().device_key)));
        assert!(!raw.contains("[1,1,1"));
    }

    #[test]
    fn test_other_seed_cannot_read() {
        let dir = TempDir::new().expect("tempdir");
        let owner = store(&dir, Network::Bitcoin, MNEMONIC);
        owner.save(&creds()).unwrap();

        // Same file and node id, key from another seed
        let other = store(&dir, Network::Bitcoin, OTHER_MNEMONIC);
        let intruder = CredentialStore {
            path: owner.path.clone(),
            node_id: owner.node_id.clone(),
            network: owner.network,
            key: other.key.clone(),
        };
        assert!(matches!(intruder.load(), Err(SdkError::Persistence(_))));

        // Under its own node id the other seed sees nothing
        assert!(other.load().unwrap().is_none());
        assert_eq!(owner.load().unwrap(), Some(creds()));
    }

    #[test]
    fn test_networks_are_separate() {
        let dir = TempDir::new().expect("tempdir");
        store(&dir, Network::Bitcoin, MNEMONIC).save(&creds()).unwrap();
        assert!(store(&dir, Network::Regtest, MNEMONIC).load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Network::Bitcoin, MNEMONIC);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(SdkError::Persistence(_))));
    }
}
