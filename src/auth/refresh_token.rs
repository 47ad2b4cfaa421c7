/// Opaque refresh token generation
///
/// Refresh tokens are 32 bytes from the OS random source, base64url encoded
/// without padding. They carry no claims; the server resolves them through the
/// session store and revokes them by overwriting the stored hash.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::TokenError;

/// Number of random bytes (256 bits of entropy)
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Generate a new plaintext refresh token
///
/// # Errors
/// Returns error if the OS random source fails
pub fn generate_refresh_token() -> Result<String, TokenError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError::Entropy(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
