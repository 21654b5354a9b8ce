use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::api::error;

/// Access-token claims. Tokens are issued by the account service; this
/// process only verifies them and reads the owner id from `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    #[cfg(test)]
    pub fn new(sub: i64, exp: u64) -> Self {
        let now = chrono::Utc::now().timestamp() as u64;
        Claims { sub, iat: now, exp: now + exp }
    }

    #[cfg(test)]
    pub fn encode(&self, secret: &[u8]) -> Result<String, error::SystemError> {
        let header = jsonwebtoken::Header::new(Algorithm::HS256);
        let token =
            jsonwebtoken::encode(&header, self, &jsonwebtoken::EncodingKey::from_secret(secret))?;
        Ok(token)
    }

    pub fn decode(token: &str, secret: &[u8]) -> Result<Self, error::SystemError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret), &validation)?;
        Ok(token_data.claims)
    }
}

/// Resolve the claims carried by an `Authorization: Bearer <token>` header value.
pub fn bearer_claims(header: Option<&str>, secret: &[u8]) -> Result<Claims, error::Error> {
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| error::Error::unauthorized("Token Invalid or Expired"))?;

    let claims = Claims::decode(token, secret)
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;

    if claims.sub < 1 {
        return Err(error::Error::unauthorized("Token Invalid or Expired"));
    }
    Ok(claims)
}
