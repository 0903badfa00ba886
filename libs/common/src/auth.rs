//! Identity types shared between the token issuer and the API gate

use anyhow::{Context, Result, bail};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// ADMIN and SUPER_ADMIN may use the back-office
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Role at the time the token was issued
    pub role: Role,
    /// Session the token belongs to
    pub sid: Uuid,
    /// Unique per token, so two tokens minted in the same second differ
    pub jti: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

/// Read an RSA key from an environment variable holding either the PEM
/// text itself or a path to a PEM file
pub fn load_key_from_env(var: &str) -> Result<String> {
    let value = std::env::var(var)
        .with_context(|| format!("{} environment variable not set", var))?;
    read_key(&value).with_context(|| format!("Failed to read key from {}", var))
}

fn read_key(value: &str) -> Result<String> {
    if value.starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    let path = PathBuf::from(value);
    let contents = std::fs::read_to_string(&path).or_else(|_| {
        let mut from_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        from_root.push("../..");
        from_root.push(&path);
        std::fs::read_to_string(from_root)
    })?;
    Ok(contents.trim().to_string())
}

/// Verifies RS256 tokens with the issuer's public key
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_public_pem(public_key: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Uses `JWT_PUBLIC_KEY`
    pub fn from_env() -> Result<Self> {
        Self::from_public_pem(&load_key_from_env("JWT_PUBLIC_KEY")?)
    }

    /// Decode a token, checking signature, expiry and token type
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;
        if claims.token_type != expected {
            bail!("expected {:?} token, got {:?}", expected, claims.token_type);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_roles() {
        assert!(!Role::User.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).unwrap(),
            "\"SUPER_ADMIN\""
        );
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_inline_pem_is_used_verbatim() {
        let pem = include_str!("../../../fixtures/jwt_test_public.pem");
        assert_eq!(read_key(pem).unwrap(), pem);
        assert!(TokenVerifier::from_public_pem(pem).is_ok());
    }

    #[test]
    fn test_key_path_relative_to_workspace() {
        let key = read_key("fixtures/jwt_test_public.pem").unwrap();
        assert!(key.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(read_key("fixtures/missing.pem").is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let verifier =
            TokenVerifier::from_public_pem(include_str!("../../../fixtures/jwt_test_public.pem"))
                .unwrap();
        assert!(verifier.verify("not-a-token", TokenType::Access).is_err());
    }
}
