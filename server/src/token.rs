use chrono::Utc;
use color_eyre::eyre::{eyre, WrapErr};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long an issued token (and the cookie carrying it) stays valid
pub const TOKEN_LIFETIME_DAYS: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// The user id, as a string
    pub id: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> color_eyre::Result<Uuid> {
        Uuid::parse_str(&self.id).wrap_err("Token id claim is not a valid user id")
    }
}

/// Signs and verifies the tokens we hand out in the session cookie.
#[derive(Clone)]
pub struct TokenConfig {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig").finish_non_exhaustive()
    }
}

impl TokenConfig {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn from_env() -> color_eyre::Result<Self> {
        let secret = std::env::var("JWT_SEC")
            .map_err(|_| eyre!("JWT_SEC environment variable not set"))?;

        if secret.is_empty() {
            return Err(eyre!("JWT_SEC must not be empty"));
        }

        Ok(Self::new(secret.as_bytes()))
    }

    /// Issue a token for the user that expires after [`TOKEN_LIFETIME_DAYS`]
    pub fn issue(&self, user_id: Uuid) -> color_eyre::Result<String> {
        let expires_at = Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS);
        let claims = Claims {
            id: user_id.to_string(),
            exp: expires_at.timestamp(),
        };

        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> color_eyre::Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .wrap_err("Failed to sign token")
    }

    /// Check signature and expiry, returning the claims on success
    pub fn verify(&self, token: &str) -> color_eyre::Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .wrap_err("Failed to verify token")
    }
}
