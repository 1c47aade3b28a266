//! Random token generation and hashing helpers.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// 32 random bytes, base64url without padding.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a refresh token so raw values never touch the database.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Stable fingerprint of a user agent string, hex encoded.
#[must_use]
pub fn fingerprint_user_agent(user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.trim().as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, byte| {
        acc.push_str(&format!("{byte:02x}"));
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_token_decodes_to_32_bytes() {
        let decoded_len = generate_opaque_token()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(TOKEN_BYTES));
    }

    #[test]
    fn opaque_tokens_are_unique() -> Result<()> {
        assert_ne!(generate_opaque_token()?, generate_opaque_token()?);
        Ok(())
    }

    #[test]
    fn hash_refresh_token_stable() {
        let first = hash_refresh_token("token");
        let second = hash_refresh_token("token");
        let different = hash_refresh_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn fingerprint_ignores_surrounding_whitespace() {
        let fp = fingerprint_user_agent("Mozilla/5.0");
        assert_eq!(fp, fingerprint_user_agent("  Mozilla/5.0 "));
        assert_eq!(fp.len(), 64);
        assert_ne!(fp, fingerprint_user_agent("curl/8.0"));
    }
}
