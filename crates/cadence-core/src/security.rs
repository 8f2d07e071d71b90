use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CryptoError;

/// Symmetric encryption for credential fields stored at rest.
///
/// Injected into the store at construction; the key's lifecycle belongs to
/// process bootstrap.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// AES-GCM with a random 96-bit nonce per value.
///
/// Output is base64(`nonce ‖ ciphertext ‖ tag`), so the nonce travels with
/// the value and decryption needs only the key.
pub struct AesGcmEncryptor {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmEncryptor {
    /// A 16-byte key selects AES-128-GCM, a 32-byte key AES-256-GCM.
    /// 24-byte keys are rejected.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let algorithm = match key.len() {
            16 => &AES_128_GCM,
            32 => &AES_256_GCM,
            n => return Err(CryptoError::InvalidKeyLength(n)),
        };
        let unbound = UnboundKey::new(algorithm, key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }
}

impl std::fmt::Debug for AesGcmEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmEncryptor")
            .field("algorithm", self.key.algorithm())
            .finish_non_exhaustive()
    }
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| CryptoError::Rng)?;

        let mut sealed = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| CryptoError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let decoded = STANDARD.decode(ciphertext)?;
        if decoded.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, sealed) = decoded.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptoError::Truncated)?;

        let mut buf = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| CryptoError::Open)?;
        Ok(String::from_utf8(plaintext.to_vec())?)
    }
}
