//! Node signer - derives the node key from the seed and signs on its behalf.
//!
//! The node secret is HKDF-SHA256 over the first 32 bytes of the seed (the hosted
//! node's HSM secret) with info `"nodeid"` and an empty salt. The node id is the
//! hex of the compressed public key.

use bitcoin::hashes::{sha256, sha256d, Hash};
use bitcoin::secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::node_api::{NodeError, NodeResult};
use crate::seed::Seed;

const NODE_ID_INFO: &[u8] = b"nodeid";
const SIGNED_MESSAGE_PREFIX: &[u8] = b"Lightning Signed Message:";

/// HKDF-SHA256 (RFC 5869) producing a single 32-byte block.
pub(crate) fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; 32] {
    let mut extract = Hmac::<Sha256>::new_from_slice(salt).expect("HMAC accepts any key length");
    extract.update(ikm);
    let prk = extract.finalize().into_bytes();

    let mut expand = Hmac::<Sha256>::new_from_slice(&prk).expect("HMAC accepts any key length");
    expand.update(info);
    expand.update(&[0x01]);
    let mut okm = [0u8; 32];
    okm.copy_from_slice(&expand.finalize().into_bytes());
    okm
}

pub struct NodeSigner {
    secp: Secp256k1<All>,
    secret: SecretKey,
    node_id: PublicKey,
}

impl NodeSigner {
    pub fn new(seed: &Seed) -> NodeResult<Self> {
        let mut okm = hkdf_sha256(&seed.as_bytes()[..32], &[], NODE_ID_INFO);
        let secret = SecretKey::from_slice(&okm).map_err(|e| NodeError::Generic(format!("node key: {e}")));
        okm.zeroize();
        let secret = secret?;
        let secp = Secp256k1::new();
        let node_id = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secp, secret, node_id })
    }

    pub fn node_id(&self) -> PublicKey { self.node_id }

    pub fn node_id_hex(&self) -> String { hex::encode(self.node_id.serialize()) }

    /// Sign a scheduler challenge: compact ECDSA over sha256(challenge).
    pub fn sign_challenge(&self, challenge: &[u8]) -> Vec<u8> {
        let digest = sha256::Hash::hash(challenge).to_byte_array();
        let sig = self.secp.sign_ecdsa(&Message::from_digest(digest), &self.secret);
        sig.serialize_compact().to_vec()
    }

    /// Sign an arbitrary message, returning the hex compact signature.
    pub fn sign_message(&self, message: &str) -> String {
        let sig = self.secp.sign_ecdsa(&message_digest(message), &self.secret);
        hex::encode(sig.serialize_compact())
    }
}

impl std::fmt::Debug for NodeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSigner").field("node_id", &self.node_id_hex()).finish()
    }
}

fn message_digest(message: &str) -> Message {
    let mut data = SIGNED_MESSAGE_PREFIX.to_vec();
    data.extend_from_slice(message.as_bytes());
    Message::from_digest(sha256d::Hash::hash(&data).to_byte_array())
}

/// Verify a challenge signature produced by [`NodeSigner::sign_challenge`].
pub fn verify_challenge(node_id: &str, challenge: &[u8], signature: &[u8]) -> bool {
    let Ok(pubkey) = parse_node_id(node_id) else { return false };
    let Ok(sig) = Signature::from_compact(signature) else { return false };
    let digest = sha256::Hash::hash(challenge).to_byte_array();
    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(digest), &sig, &pubkey)
        .is_ok()
}

/// Check a message signature against a node id. Malformed input is a failed check.
pub fn check_message(message: &str, pubkey: &str, signature: &str) -> bool {
    let Ok(pubkey) = parse_node_id(pubkey) else { return false };
    let Ok(raw) = hex::decode(signature) else { return false };
    let Ok(sig) = Signature::from_compact(&raw) else { return false };
    Secp256k1::verification_only()
        .verify_ecdsa(&message_digest(message), &sig, &pubkey)
        .is_ok()
}

pub fn parse_node_id(node_id: &str) -> NodeResult<PublicKey> {
    let raw = hex::decode(node_id).map_err(|e| NodeError::Generic(format!("node id hex: {e}")))?;
    PublicKey::from_slice(&raw).map_err(|e| NodeError::Generic(format!("node id: {e}")))
}
