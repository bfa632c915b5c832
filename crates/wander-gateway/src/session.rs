use jsonwebtoken::{DecodingKey, Validation, decode};

use wander_types::api::Claims;

/// Verify a bearer token and return its claims. Expiry is enforced.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
