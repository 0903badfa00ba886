//! JWT service for token generation, validation, and management
//!
//! Tokens are signed with RS256. Every token carries the session it was
//! issued for, so revoking the session invalidates both tokens. Rotated or
//! logged-out refresh tokens are additionally revoked in the cache until
//! they would have expired.

use anyhow::Result;
use common::{
    auth::{Claims, Role, TokenType, TokenVerifier, load_key_from_env},
    cache::Cache,
    token::sha256_hex,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

const REVOKED_TOKEN_PREFIX: &str = "revoked_token:";

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Private key for signing tokens
    pub private_key: String,
    /// Public key for verifying tokens
    pub public_key: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PRIVATE_KEY`: PEM text or path to the private key
    /// - `JWT_PUBLIC_KEY`: PEM text or path to the public key
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    ///
    /// The refresh token lives as long as the session it belongs to.
    pub fn from_env(session_ttl_seconds: u64) -> Result<Self> {
        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(900);

        Ok(JwtConfig {
            private_key: load_key_from_env("JWT_PRIVATE_KEY")?,
            public_key: load_key_from_env("JWT_PUBLIC_KEY")?,
            access_token_expiry,
            refresh_token_expiry: session_ttl_seconds,
        })
    }
}

/// Access and refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
    config: JwtConfig,
}

fn now_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

fn revoked_key(token: &str) -> String {
    format!("{}{}", REVOKED_TOKEN_PREFIX, sha256_hex(token))
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let verifier = TokenVerifier::from_public_pem(&config.public_key)?;

        Ok(JwtService {
            encoding_key,
            verifier,
            config,
        })
    }

    fn sign(
        &self,
        user_id: Uuid,
        role: Role,
        session_id: Uuid,
        token_type: TokenType,
    ) -> Result<String> {
        let now = now_secs()?;
        let lifetime = match token_type {
            TokenType::Access => self.config.access_token_expiry,
            TokenType::Refresh => self.config.refresh_token_expiry,
        };

        let claims = Claims {
            sub: user_id,
            role,
            sid: session_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + lifetime,
            token_type,
        };

        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Generate an access token for a user session
    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        role: Role,
        session_id: Uuid,
    ) -> Result<String> {
        self.sign(user_id, role, session_id, TokenType::Access)
    }

    /// Generate a refresh token for a user session
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        role: Role,
        session_id: Uuid,
    ) -> Result<String> {
        self.sign(user_id, role, session_id, TokenType::Refresh)
    }

    pub fn generate_pair(&self, user_id: Uuid, role: Role, session_id: Uuid) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user_id, role, session_id)?,
            refresh_token: self.generate_refresh_token(user_id, role, session_id)?,
        })
    }

    /// Validate a token of the given type and return the claims
    pub fn validate_token(&self, token: &str, expected: TokenType) -> Result<Claims> {
        self.verifier.verify(token, expected)
    }

    /// Check if a token has been revoked
    pub async fn is_token_revoked(&self, cache: &dyn Cache, token: &str) -> Result<bool> {
        Ok(cache.get(&revoked_key(token)).await?.is_some())
    }

    /// Revoke a token for the rest of its lifetime
    pub async fn revoke_token(
        &self,
        cache: &dyn Cache,
        token: &str,
        claims: &Claims,
    ) -> Result<()> {
        let remaining = claims.exp.saturating_sub(now_secs()?).max(1);
        cache.set(&revoked_key(token), "1", Some(remaining)).await?;
        info!("Revoked {:?} token of session {}", claims.token_type, claims.sid);
        Ok(())
    }

    /// Rotate a refresh token
    ///
    /// Revokes the presented refresh token and issues a new pair for the
    /// same session, carrying the user's current role.
    pub async fn rotate_refresh_token(
        &self,
        cache: &dyn Cache,
        old_refresh_token: &str,
        old_claims: &Claims,
        role: Role,
    ) -> Result<TokenPair> {
        self.revoke_token(cache, old_refresh_token, old_claims).await?;
        self.generate_pair(old_claims.sub, role, old_claims.sid)
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }
}
