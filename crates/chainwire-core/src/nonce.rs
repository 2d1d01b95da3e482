//! Replay-protection nonces.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CoreError;

/// Length of every nonce placed in a signature header.
pub const NONCE_SIZE: usize = 24;

/// Draw a fresh nonce from the operating system's secure entropy source.
///
/// Fails only if the entropy source is unavailable. There is no fallback
/// to a weaker source.
pub fn create_nonce() -> Result<[u8; NONCE_SIZE], CoreError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CoreError::EntropyUnavailable(e.to_string()))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_length() {
        let nonce = create_nonce().unwrap();
        assert_eq!(nonce.len(), NONCE_SIZE);
    }

    #[test]
    fn test_nonces_differ() {
        let a = create_nonce().unwrap();
        let b = create_nonce().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_nonces_are_distinct() {
        use std::collections::HashSet;
        use std::thread;

        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let nonces: Vec<[u8; NONCE_SIZE]> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        (0..PER_THREAD)
                            .map(|_| create_nonce().unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(nonces.len(), THREADS * PER_THREAD);
        let distinct: HashSet<_> = nonces.iter().collect();
        assert_eq!(distinct.len(), THREADS * PER_THREAD);
    }
}
