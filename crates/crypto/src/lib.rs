//! Cryptographic primitives for the AEDPoS consensus core.
//!
//! Three concerns live here:
//!
//! - **Commit-reveal**: one-way commitments binding each miner to a secret
//!   one round before it is disclosed.
//! - **Threshold secret sharing**: Shamir splitting so a committee can
//!   reconstruct the secret of a miner that went silent.
//! - **VRF**: proof verification for the random value each block carries.
//!
//! Everything is deterministic given its inputs; no global state, no I/O.

pub mod commit;
pub mod secret_sharing;
pub mod share_encryption;
pub mod vrf;

pub use commit::{commit, reveal_check};
pub use secret_sharing::{field_prime, reconstruct, split, SecretShare, SecretSharingError};
pub use share_encryption::{decrypt_share, encrypt_share, pairwise_key};
pub use vrf::{VrfError, VrfProof, VrfPublicKey, VrfSecretKey};
