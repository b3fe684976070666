//! Cryptographically secure randomness for OTP codes and lookup tokens.

use rand::{rngs::OsRng, Rng, RngCore};
use std::fmt;

/// Number of digits in an OTP code.
pub const OTP_CODE_DIGITS: usize = 6;

/// Random bytes behind a consultation lookup token (hex-encoded, 64 chars).
pub const LOOKUP_TOKEN_BYTES: usize = 32;

pub trait SecureRandom: Send + Sync + fmt::Debug {
    /// Returns a zero-padded numeric code of [`OTP_CODE_DIGITS`] digits.
    fn otp_code(&self) -> String;

    /// Returns an opaque, URL-safe lookup token.
    fn lookup_token(&self) -> String;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn otp_code(&self) -> String {
        let code: u32 = OsRng.gen_range(0..1_000_000);
        format!("{:0width$}", code, width = OTP_CODE_DIGITS)
    }

    fn lookup_token(&self) -> String {
        let mut bytes = [0u8; LOOKUP_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn otp_codes_are_six_digits() {
        let random = OsSecureRandom;
        for _ in 0..200 {
            let code = random.otp_code();
            assert_eq!(code.len(), OTP_CODE_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "{code}");
        }
    }

    #[test]
    fn lookup_tokens_are_hex_and_distinct() {
        let random = OsSecureRandom;
        let tokens: HashSet<String> = (0..50).map(|_| random.lookup_token()).collect();
        assert_eq!(tokens.len(), 50);
        for token in &tokens {
            assert_eq!(token.len(), LOOKUP_TOKEN_BYTES * 2);
            assert!(hex::decode(token).is_ok());
        }
    }
}
