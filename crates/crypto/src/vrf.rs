//! Verifiable random function (ECVRF, EDWARDS25519-SHA512-TAI shape).
//!
//! A block carries a `(proof, claimed_random_value)` pair; verification
//! recomputes the challenge against the prior round's published random
//! value and returns the proof's output hash. Proof failure is fatal to the
//! candidate block, never retried.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use sha2::{Digest, Sha512};
use thiserror::Error;

const SUITE_HASH_TO_CURVE: u8 = 0x01;
const SUITE_CHALLENGE: u8 = 0x02;
const SUITE_PROOF_TO_HASH: u8 = 0x03;

/// VRF verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VrfError {
    /// Public key bytes do not decode to a curve point.
    #[error("invalid VRF public key")]
    InvalidPublicKey,

    /// Proof bytes are malformed or off-curve.
    #[error("invalid VRF proof encoding")]
    InvalidProof,

    /// No curve point found while hashing to the curve.
    #[error("hash-to-curve failed")]
    HashToCurveFailed,

    /// The challenge recomputation did not match.
    #[error("VRF proof verification failed")]
    VerificationFailed,
}

/// An ECVRF proof: gamma point, challenge and response scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfProof {
    gamma: [u8; 32],
    c: [u8; 32],
    s: [u8; 32],
}

impl VrfProof {
    /// Serialized proof length.
    pub const BYTES: usize = 96;

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut bytes = [0u8; 96];
        bytes[0..32].copy_from_slice(&self.gamma);
        bytes[32..64].copy_from_slice(&self.c);
        bytes[64..96].copy_from_slice(&self.s);
        bytes
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        if bytes.len() != Self::BYTES {
            return Err(VrfError::InvalidProof);
        }
        let mut gamma = [0u8; 32];
        let mut c = [0u8; 32];
        let mut s = [0u8; 32];
        gamma.copy_from_slice(&bytes[0..32]);
        c.copy_from_slice(&bytes[32..64]);
        s.copy_from_slice(&bytes[64..96]);
        Ok(Self { gamma, c, s })
    }
}

/// VRF public key for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfPublicKey {
    bytes: [u8; 32],
}

impl VrfPublicKey {
    /// Create from compressed point bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, VrfError> {
        CompressedEdwardsY(bytes)
            .decompress()
            .ok_or(VrfError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Get the compressed point bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a proof over `alpha` and return the proof's output hash.
    pub fn verify(&self, alpha: &[u8], proof: &VrfProof) -> Result<[u8; 32], VrfError> {
        let pk_point = CompressedEdwardsY(self.bytes)
            .decompress()
            .ok_or(VrfError::InvalidPublicKey)?;

        let h_point = hash_to_curve(&self.bytes, alpha)?;

        let gamma_point = CompressedEdwardsY(proof.gamma)
            .decompress()
            .ok_or(VrfError::InvalidProof)?;

        let c_scalar = Scalar::from_bytes_mod_order(proof.c);
        let s_scalar = Scalar::from_bytes_mod_order(proof.s);

        // U = s*G - c*Y and V = s*H - c*Gamma undo the prover's commitments.
        let u_point = ED25519_BASEPOINT_POINT * s_scalar - pk_point * c_scalar;
        let v_point = h_point * s_scalar - gamma_point * c_scalar;

        let c_verify = compute_challenge(&pk_point, &h_point, &gamma_point, &u_point, &v_point);
        if c_verify.as_bytes() != &proof.c {
            return Err(VrfError::VerificationFailed);
        }

        Ok(gamma_to_output(&gamma_point))
    }
}

/// VRF secret key for proving.
#[derive(Clone)]
pub struct VrfSecretKey {
    inner: SigningKey,
}

impl VrfSecretKey {
    /// Generate a new random secret key.
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Create from seed bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: SigningKey::from_bytes(&seed),
        }
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> VrfPublicKey {
        VrfPublicKey {
            bytes: self.inner.verifying_key().to_bytes(),
        }
    }

    /// Compute the VRF output and proof for `alpha`.
    pub fn prove(&self, alpha: &[u8]) -> Result<([u8; 32], VrfProof), VrfError> {
        let pk_bytes = self.inner.verifying_key().to_bytes();
        let pk_point = CompressedEdwardsY(pk_bytes)
            .decompress()
            .ok_or(VrfError::InvalidPublicKey)?;

        let h_point = hash_to_curve(&pk_bytes, alpha)?;

        let x_scalar = secret_scalar(&self.inner);
        let gamma_point = h_point * x_scalar;

        let k_scalar = deterministic_nonce(&self.inner, alpha);
        let u_point = ED25519_BASEPOINT_POINT * k_scalar;
        let v_point = h_point * k_scalar;

        let c_scalar = compute_challenge(&pk_point, &h_point, &gamma_point, &u_point, &v_point);
        let s_scalar = k_scalar + c_scalar * x_scalar;

        let proof = VrfProof {
            gamma: gamma_point.compress().to_bytes(),
            c: c_scalar.to_bytes(),
            s: s_scalar.to_bytes(),
        };

        Ok((gamma_to_output(&gamma_point), proof))
    }
}

impl std::fmt::Debug for VrfSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrfSecretKey")
            .field("public", &hex::encode(&self.public_key().bytes[..8]))
            .finish()
    }
}

/// Hash to curve using try-and-increment.
fn hash_to_curve(pk: &[u8; 32], alpha: &[u8]) -> Result<EdwardsPoint, VrfError> {
    for counter in 0u8..=254 {
        let mut hasher = Sha512::new();
        hasher.update([SUITE_HASH_TO_CURVE]);
        hasher.update(pk);
        hasher.update(alpha);
        hasher.update([counter]);
        let hash = hasher.finalize();

        let mut point_bytes = [0u8; 32];
        point_bytes.copy_from_slice(&hash[0..32]);

        if let Some(point) = CompressedEdwardsY(point_bytes).decompress() {
            // Clear the cofactor to land in the prime-order subgroup.
            return Ok(point.mul_by_cofactor());
        }
    }
    Err(VrfError::HashToCurveFailed)
}

/// Challenge scalar from the five proof points.
fn compute_challenge(
    pk: &EdwardsPoint,
    h: &EdwardsPoint,
    gamma: &EdwardsPoint,
    u: &EdwardsPoint,
    v: &EdwardsPoint,
) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update([SUITE_CHALLENGE]);
    hasher.update(pk.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    hasher.update(gamma.compress().as_bytes());
    hasher.update(u.compress().as_bytes());
    hasher.update(v.compress().as_bytes());
    let hash = hasher.finalize();

    // First 16 bytes of the hash form the challenge.
    let mut c_bytes = [0u8; 32];
    c_bytes[0..16].copy_from_slice(&hash[0..16]);
    Scalar::from_bytes_mod_order(c_bytes)
}

/// Convert the gamma point to the VRF output hash.
fn gamma_to_output(gamma: &EdwardsPoint) -> [u8; 32] {
    let gamma_cleared = gamma.mul_by_cofactor();
    let mut hasher = Sha512::new();
    hasher.update([SUITE_PROOF_TO_HASH]);
    hasher.update(gamma_cleared.compress().as_bytes());
    let hash = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&hash[0..32]);
    output
}

/// Expand the signing key seed into its clamped secret scalar.
fn secret_scalar(key: &SigningKey) -> Scalar {
    let expanded = Sha512::digest(key.to_bytes());
    let mut bits = [0u8; 32];
    bits.copy_from_slice(&expanded[..32]);
    bits[0] &= 248;
    bits[31] &= 127;
    bits[31] |= 64;
    Scalar::from_bytes_mod_order(bits)
}

/// Deterministic nonce from the seed's upper half and the message.
fn deterministic_nonce(key: &SigningKey, alpha: &[u8]) -> Scalar {
    let expanded = Sha512::digest(key.to_bytes());
    let mut hasher = Sha512::new();
    hasher.update(&expanded[32..]);
    hasher.update(alpha);
    let wide: [u8; 64] = hasher.finalize().into();
    Scalar::from_bytes_mod_order_wide(&wide)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair(seed: u64) -> VrfSecretKey {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        VrfSecretKey::generate(&mut rng)
    }

    #[test]
    fn test_prove_verify_roundtrip() {
        let sk = keypair(1);
        let alpha = b"previous round random value";

        let (output, proof) = sk.prove(alpha).unwrap();
        let verified = sk.public_key().verify(alpha, &proof).unwrap();
        assert_eq!(output, verified);
    }

    #[test]
    fn test_proof_is_deterministic() {
        let sk = keypair(2);
        let (out1, proof1) = sk.prove(b"alpha").unwrap();
        let (out2, proof2) = sk.prove(b"alpha").unwrap();
        assert_eq!(out1, out2);
        assert_eq!(proof1, proof2);
    }

    #[test]
    fn test_wrong_alpha_fails() {
        let sk = keypair(3);
        let (_, proof) = sk.prove(b"alpha").unwrap();
        assert_eq!(
            sk.public_key().verify(b"beta", &proof),
            Err(VrfError::VerificationFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let sk = keypair(4);
        let other = keypair(5);
        let (_, proof) = sk.prove(b"alpha").unwrap();
        assert_eq!(
            other.public_key().verify(b"alpha", &proof),
            Err(VrfError::VerificationFailed)
        );
    }

    #[test]
    fn test_outputs_differ_per_key() {
        let (out1, _) = keypair(6).prove(b"alpha").unwrap();
        let (out2, _) = keypair(7).prove(b"alpha").unwrap();
        assert_ne!(out1, out2);
    }

    #[test]
    fn test_proof_byte_roundtrip() {
        let sk = keypair(8);
        let (_, proof) = sk.prove(b"alpha").unwrap();
        let decoded = VrfProof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(proof, decoded);

        assert_eq!(VrfProof::from_bytes(&[0u8; 10]), Err(VrfError::InvalidProof));
    }
}
