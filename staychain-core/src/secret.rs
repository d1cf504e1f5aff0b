//! Secret wrapper for the attestation signing key.

use std::fmt;

use bitcoin::secp256k1::{PublicKey, Secp256k1, Signing};
use bitcoin::{Network, PrivateKey};
use zeroize::Zeroizing;

use crate::commitment::CommitmentHash;
use crate::crypto::tweak_secret_key;
use crate::error::{Error, Result};

/// The wallet signing key of an attestation co-signer.
///
/// Key material is erased on drop and never printed; Debug output is
/// redacted. The key must not cross the store or log boundaries.
pub struct SigningKey {
    inner: PrivateKey,
}

impl SigningKey {
    /// Parse from wallet-import format. The input string is zeroised once
    /// decoded.
    pub fn from_wif(wif: &str) -> Result<Self> {
        let wif = Zeroizing::new(wif.to_owned());
        let inner =
            PrivateKey::from_wif(&wif).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Wrap an existing private key.
    pub fn new(inner: PrivateKey) -> Self {
        Self { inner }
    }

    /// The corresponding public key.
    pub fn public_key<C: Signing>(&self, secp: &Secp256k1<C>) -> PublicKey {
        self.inner.inner.public_key(secp)
    }

    /// Derive the key for a commitment: `(sk + commitment) mod n`.
    pub fn tweaked(&self, tweak: &CommitmentHash) -> Result<Self> {
        let tweaked = tweak_secret_key(&self.inner.inner, tweak)?;
        Ok(Self {
            inner: PrivateKey {
                compressed: self.inner.compressed,
                network: self.inner.network,
                inner: tweaked,
            },
        })
    }

    /// Borrow the underlying key for signing or wallet import.
    pub fn as_priv(&self) -> &PrivateKey {
        &self.inner
    }

    /// Network the key was encoded for.
    pub fn network(&self) -> Network {
        match self.inner.network {
            bitcoin::NetworkKind::Main => Network::Bitcoin,
            bitcoin::NetworkKind::Test => Network::Testnet,
        }
    }
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self { inner: self.inner }
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.inner.inner.non_secure_erase();
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{rand, SecretKey};

    #[test]
    fn test_debug_is_redacted() {
        let sk = SecretKey::new(&mut rand::thread_rng());
        let key = SigningKey::new(PrivateKey::new(sk, Network::Regtest));
        assert_eq!(format!("{:?}", key), "SigningKey(<redacted>)");
    }

    #[test]
    fn test_wif_roundtrip_pubkey() {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut rand::thread_rng());
        let priv_key = PrivateKey::new(sk, Network::Regtest);
        let key = SigningKey::from_wif(&priv_key.to_wif()).unwrap();
        assert_eq!(key.public_key(&secp), sk.public_key(&secp));
    }

    #[test]
    fn test_tweaked_matches_pub_tweak() {
        use crate::crypto::tweak_public_key;

        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut rand::thread_rng());
        let key = SigningKey::new(PrivateKey::new(sk, Network::Regtest));
        let tweak: CommitmentHash =
            "1a39e34e881d9a1e6cdc3418b54aa57747106bc75e9e84426661f27f98ada3b7"
                .parse()
                .unwrap();

        let tweaked = key.tweaked(&tweak).unwrap();
        let expected = tweak_public_key(&secp, &key.public_key(&secp), &tweak).unwrap();
        assert_eq!(tweaked.public_key(&secp), expected);
    }

    #[test]
    fn test_invalid_wif_rejected() {
        assert!(SigningKey::from_wif("not-a-wif").is_err());
    }
}
