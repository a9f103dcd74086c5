//! Local secp256k1 signing for contract-creation transactions.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{Encodable, Header},
};
use k256::ecdsa::SigningKey;

/// A legacy (pre-EIP-2718) contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub value: U256,
    pub data: Bytes,
}

impl CreationTransaction {
    /// EIP-155 signing hash for `chain_id`.
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        let mut out = Vec::new();
        self.encode_fields(&mut out, chain_id, U256::ZERO, U256::ZERO);
        keccak256(out)
    }

    /// RLP list of the nine legacy fields; `to` is always empty for creation.
    fn encode_fields(&self, out: &mut Vec<u8>, v: u64, r: U256, s: U256) {
        let empty_to: &[u8] = &[];
        let payload_length = self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + empty_to.length()
            + self.value.length()
            + self.data.length()
            + v.length()
            + r.length()
            + s.length();

        Header {
            list: true,
            payload_length,
        }
        .encode(out);
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        empty_to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        v.encode(out);
        r.encode(out);
        s.encode(out);
    }
}

/// A private key held in process, used on networks without node-managed accounts.
#[derive(Clone)]
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Create a signer from a 32-byte private key (hex, with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, anyhow::Error> {
        let private_key_hex = private_key_hex
            .trim()
            .strip_prefix("0x")
            .unwrap_or(private_key_hex.trim());

        let private_key_bytes: [u8; 32] = hex::decode(private_key_hex)?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Private key must be exactly 32 bytes"))?;

        let signing_key = SigningKey::from_bytes(&private_key_bytes.into())
            .map_err(|e| anyhow::anyhow!("Invalid secp256k1 private key: {}", e))?;

        // Address is the last 20 bytes of keccak(uncompressed pubkey without 0x04 marker).
        let public_key_point = signing_key.verifying_key().to_encoded_point(false);
        let address = Address::from_raw_public_key(&public_key_point.as_bytes()[1..]);

        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `tx` for `chain_id` and return the raw transaction bytes.
    pub fn sign_creation(
        &self,
        tx: &CreationTransaction,
        chain_id: u64,
    ) -> Result<Bytes, anyhow::Error> {
        let hash = tx.signing_hash(chain_id);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| anyhow::anyhow!("Failed to sign transaction: {}", e))?;

        let bytes = signature.to_bytes();
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);
        let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());

        let mut out = Vec::new();
        tx.encode_fields(&mut out, v, r, s);
        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::rlp::Decodable;

    // First account of the hardhat/anvil default mnemonic.
    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn sample_tx() -> CreationTransaction {
        CreationTransaction {
            nonce: 3,
            gas_price: U256::from(1_000_000_000u64),
            gas_limit: 3_000_000,
            value: U256::ZERO,
            data: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
        }
    }

    #[test]
    fn test_address_derivation() {
        let signer = LocalSigner::from_private_key(HARDHAT_KEY).unwrap();
        assert_eq!(signer.address(), HARDHAT_ADDRESS.parse::<Address>().unwrap());

        let without_prefix = LocalSigner::from_private_key(&HARDHAT_KEY[2..]).unwrap();
        assert_eq!(without_prefix.address(), signer.address());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(LocalSigner::from_private_key("0x1234").is_err());
        assert!(LocalSigner::from_private_key("not-hex").is_err());
        assert!(LocalSigner::from_private_key(&format!("0x{}", "00".repeat(32))).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = LocalSigner::from_private_key(HARDHAT_KEY).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains("ac0974bec39a17e3"));
    }

    #[test]
    fn test_signing_hash_depends_on_chain() {
        let tx = sample_tx();
        assert_ne!(tx.signing_hash(1), tx.signing_hash(31337));
        assert_eq!(tx.signing_hash(1), tx.signing_hash(1));
    }

    #[test]
    fn test_signed_creation_is_rlp_list_with_eip155_v() {
        let signer = LocalSigner::from_private_key(HARDHAT_KEY).unwrap();
        let raw = signer.sign_creation(&sample_tx(), 31337).unwrap();

        let mut buf: &[u8] = &raw;
        let header = Header::decode(&mut buf).unwrap();
        assert!(header.list);
        assert_eq!(header.payload_length, buf.len());

        let nonce = u64::decode(&mut buf).unwrap();
        let gas_price = U256::decode(&mut buf).unwrap();
        let gas_limit = u64::decode(&mut buf).unwrap();
        let to = Bytes::decode(&mut buf).unwrap();
        let value = U256::decode(&mut buf).unwrap();
        let data = Bytes::decode(&mut buf).unwrap();
        let v = u64::decode(&mut buf).unwrap();

        assert_eq!(nonce, 3);
        assert_eq!(gas_price, U256::from(1_000_000_000u64));
        assert_eq!(gas_limit, 3_000_000);
        assert!(to.is_empty());
        assert_eq!(value, U256::ZERO);
        assert_eq!(data, sample_tx().data);
        assert!(v == 31337 * 2 + 35 || v == 31337 * 2 + 36);
    }
}
