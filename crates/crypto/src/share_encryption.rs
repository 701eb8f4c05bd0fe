//! Per-recipient share encryption.
//!
//! Shares travel on-chain encrypted to each recipient. Key agreement is a
//! transport concern handled by the surrounding node; the pipeline only
//! needs a symmetric keyed roundtrip between each pair of miners, modeled
//! here as a keyed blake3 stream.

use aedpos_types::MinerId;

const STREAM_CONTEXT: &[u8] = b"aedpos-share-stream";

/// Derive the symmetric key shared by a pair of miners.
///
/// Symmetric in its arguments, so sender and recipient derive the same key.
pub fn pairwise_key(a: &MinerId, b: &MinerId) -> [u8; 32] {
    let (lo, hi) = if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    };
    let mut hasher = blake3::Hasher::new();
    hasher.update(STREAM_CONTEXT);
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Encrypt a share for a recipient by xoring with a keyed keystream.
pub fn encrypt_share(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    apply_keystream(key, plaintext)
}

/// Decrypt a share received from a peer.
pub fn decrypt_share(key: &[u8; 32], ciphertext: &[u8]) -> Vec<u8> {
    apply_keystream(key, ciphertext)
}

fn apply_keystream(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut keystream = vec![0u8; data.len()];
    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(STREAM_CONTEXT);
    hasher.finalize_xof().fill(&mut keystream);

    keystream
        .iter()
        .zip(data.iter())
        .map(|(k, d)| k ^ d)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miner(n: u8) -> MinerId {
        MinerId([n; 32])
    }

    #[test]
    fn test_pairwise_key_is_symmetric() {
        let a = miner(1);
        let b = miner(2);
        assert_eq!(pairwise_key(&a, &b), pairwise_key(&b, &a));
        assert_ne!(pairwise_key(&a, &b), pairwise_key(&a, &miner(3)));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = pairwise_key(&miner(1), &miner(2));
        let plaintext = b"a field element share".to_vec();

        let ciphertext = encrypt_share(&key, &plaintext);
        assert_ne!(ciphertext, plaintext);
        assert_eq!(decrypt_share(&key, &ciphertext), plaintext);
    }

    #[test]
    fn test_wrong_key_garbles() {
        let key = pairwise_key(&miner(1), &miner(2));
        let wrong = pairwise_key(&miner(1), &miner(3));
        let ciphertext = encrypt_share(&key, b"share");
        assert_ne!(decrypt_share(&wrong, &ciphertext), b"share".to_vec());
    }
}
