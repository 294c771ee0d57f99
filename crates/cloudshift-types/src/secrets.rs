//! Injectable random sources for generated credentials

use rand::distributions::Alphanumeric;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of generated usernames and passwords
pub trait SecretGenerator: Send + Sync {
    /// Alphanumeric string of the given length
    fn alphanumeric(&self, len: usize) -> String;

    fn password(&self) -> String {
        self.alphanumeric(24)
    }
}

/// Cryptographically secure generator backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecretGenerator;

impl SecretGenerator for OsSecretGenerator {
    fn alphanumeric(&self, len: usize) -> String {
        OsRng
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

/// Deterministic generator for tests and reproducible plans
#[derive(Debug)]
pub struct SeededSecretGenerator {
    rng: Mutex<StdRng>,
}

impl SeededSecretGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SecretGenerator for SeededSecretGenerator {
    fn alphanumeric(&self, len: usize) -> String {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (&mut *rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a = SeededSecretGenerator::new(7);
        let b = SeededSecretGenerator::new(7);
        assert_eq!(a.password(), b.password());
        assert_eq!(a.alphanumeric(8), b.alphanumeric(8));
    }

    #[test]
    fn test_os_generator_produces_alphanumeric() {
        let password = OsSecretGenerator.password();
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
