use crate::Generator;
use linkhop_core::ShortCode;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the codes produced by [`RandomGenerator::default`].
pub const DEFAULT_CODE_LENGTH: usize = 10;

/// Draws fixed-length codes uniformly from `[A-Za-z0-9]`.
///
/// Each call uses the calling thread's random source, so a single instance
/// can be shared freely across tasks.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    /// Creates a generator producing codes of `length` characters.
    ///
    /// `length` is clamped to `1..=32` so every output is a valid short code.
    pub fn with_length(length: usize) -> Self {
        Self {
            length: length.clamp(1, 32),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::with_length(DEFAULT_CODE_LENGTH)
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        ShortCode::new_unchecked(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn produces_fixed_length_alphanumeric_codes() {
        let generator = RandomGenerator::default();

        for _ in 0..100 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), DEFAULT_CODE_LENGTH);
            assert!(code.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(ShortCode::new(code.as_str()).is_ok());
        }
    }

    #[test]
    fn codes_are_not_repeated_in_practice() {
        let generator = RandomGenerator::default();
        let codes: HashSet<String> = (0..1_000)
            .map(|_| generator.generate().as_str().to_owned())
            .collect();

        assert_eq!(codes.len(), 1_000);
    }

    #[test]
    fn length_is_clamped() {
        assert_eq!(RandomGenerator::with_length(0).length(), 1);
        assert_eq!(RandomGenerator::with_length(64).length(), 32);
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RandomGenerator>();
    }

    #[test]
    fn concurrent_generation() {
        let generator = RandomGenerator::default();
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(move || generator.generate()))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str().len(), DEFAULT_CODE_LENGTH);
        }
    }
}
