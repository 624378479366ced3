use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Issuer written into every token and required during validation.
pub const ISSUER: &str = "tts-gateway";

/// How long past expiry a token may still be refreshed.
const REFRESH_GRACE_SECS: i64 = 3600;

/// Claims carried by gateway-issued tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// User identifier
    pub sub: String,
    pub role: String,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
    pub iss: String,
    /// Caller-supplied custom claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed validation outcome for a presented token.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token too old to refresh")]
    TooOldToRefresh,

    #[error("no token provided")]
    Missing,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Expired => "TOKEN_EXPIRED",
            TokenError::BadSignature => "INVALID_SIGNATURE",
            TokenError::Malformed(_) => "INVALID_TOKEN",
            TokenError::TooOldToRefresh => "TOKEN_TOO_OLD",
            TokenError::Missing => "MISSING_TOKEN",
        }
    }
}

/// Token plus issuance metadata, returned to the caller of generate_token.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: String,
    pub role: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub expires_in_seconds: u64,
}

/// Issues and validates HS256 tokens. Stateless: a pure function of the
/// presented token and the server secret. Tokens are invalidated only by
/// expiry; there is no revocation list.
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: secret.to_vec(),
            ttl,
        }
    }

    /// Mint a token for `user_id` with the configured TTL, valid from `now`.
    pub fn issue(
        &self,
        user_id: &str,
        role: &str,
        extra: Map<String, Value>,
        now: SystemTime,
    ) -> Result<IssuedToken, AppError> {
        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AppError::Internal("Failed to get current time".to_string()))?
            .as_secs() as i64;
        let exp = iat + self.ttl.as_secs() as i64;

        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            iat,
            exp,
            iss: ISSUER.to_string(),
            extra,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AppError::Internal(format!("Failed to encode token: {e}")))?;

        Ok(IssuedToken {
            token,
            user_id: user_id.to_string(),
            role: role.to_string(),
            issued_at: iat,
            expires_at: exp,
            expires_in_seconds: self.ttl.as_secs(),
        })
    }

    /// Verify signature, issuer and expiry. Accepts a leading "Bearer " prefix.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }

    /// Re-issue a token that is still valid or expired less than an hour ago,
    /// preserving its subject, role and custom claims. The signature and
    /// issuer must still check out.
    pub fn refresh(&self, token: &str, now: SystemTime) -> Result<IssuedToken, AppError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(TokenError::Missing.into());
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);
        validation.validate_exp = false;

        let claims =
            decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
                .map(|data| data.claims)
                .map_err(map_decode_error)?;

        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AppError::Internal("Failed to get current time".to_string()))?
            .as_secs() as i64;
        if now_secs - claims.exp > REFRESH_GRACE_SECS {
            return Err(TokenError::TooOldToRefresh.into());
        }

        self.issue(&claims.sub, &claims.role, claims.extra, now)
    }
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
        other => TokenError::Malformed(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use serde_json::{json, Map};

    use super::{TokenError, TokenService};
    use crate::error::AppError;

    fn service() -> TokenService {
        TokenService::new(
            b"test_secret_key_for_testing_purposes_only",
            Duration::from_secs(24 * 3600),
        )
    }

    #[test]
    fn test_issue_and_validate_roundtrip() {
        let tokens = service();

        let issued = tokens
            .issue("u1", "user", Map::new(), SystemTime::now())
            .unwrap();
        let claims = tokens.validate(&issued.token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, "user");
        assert_eq!(claims.iss, super::ISSUER);
        assert_eq!(claims.exp, claims.iat + 24 * 3600);
    }

    #[test]
    fn test_extra_claims_survive_roundtrip() {
        let tokens = service();
        let mut extra = Map::new();
        extra.insert("plan".to_string(), json!("premium"));
        extra.insert("credits".to_string(), json!(500));

        let issued = tokens
            .issue("alice", "premium", extra, SystemTime::now())
            .unwrap();
        let claims = tokens.validate(&issued.token).unwrap();

        assert_eq!(claims.extra.get("plan"), Some(&json!("premium")));
        assert_eq!(claims.extra.get("credits"), Some(&json!(500)));
    }

    #[test]
    fn test_expired_token() {
        let tokens = service();

        // Issued 25 hours ago so a 24-hour token is an hour past expiry,
        // well beyond the default leeway.
        let then = SystemTime::now() - Duration::from_secs(25 * 3600);
        let issued = tokens.issue("u1", "user", Map::new(), then).unwrap();

        assert_eq!(tokens.validate(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_bad_signature() {
        let tokens_a = TokenService::new(b"secret-A", Duration::from_secs(3600));
        let tokens_b = TokenService::new(b"secret-B", Duration::from_secs(3600));

        let issued = tokens_a
            .issue("u1", "user", Map::new(), SystemTime::now())
            .unwrap();

        assert_eq!(
            tokens_b.validate(&issued.token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_bearer_prefix_stripped() {
        let tokens = service();

        let issued = tokens
            .issue("u1", "user", Map::new(), SystemTime::now())
            .unwrap();
        let claims = tokens.validate(&format!("Bearer {}", issued.token)).unwrap();

        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn test_refresh_preserves_claims() {
        let tokens = service();
        let mut extra = Map::new();
        extra.insert("plan".to_string(), json!("premium"));

        let then = SystemTime::now() - Duration::from_secs(3600);
        let issued = tokens.issue("alice", "premium", extra, then).unwrap();

        let refreshed = tokens.refresh(&issued.token, SystemTime::now()).unwrap();
        let claims = tokens.validate(&refreshed.token).unwrap();

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.role, "premium");
        assert_eq!(claims.extra.get("plan"), Some(&json!("premium")));
        assert!(refreshed.expires_at > issued.expires_at);
    }

    #[test]
    fn test_refresh_accepts_recently_expired_token() {
        let tokens = service();

        // Expired 30 minutes ago, inside the one-hour refresh grace.
        let then = SystemTime::now() - Duration::from_secs(24 * 3600 + 30 * 60);
        let issued = tokens.issue("u1", "user", Map::new(), then).unwrap();
        assert_eq!(tokens.validate(&issued.token), Err(TokenError::Expired));

        let refreshed = tokens.refresh(&issued.token, SystemTime::now()).unwrap();
        assert!(tokens.validate(&refreshed.token).is_ok());
    }

    #[test]
    fn test_refresh_rejects_token_expired_over_an_hour() {
        let tokens = service();

        let then = SystemTime::now() - Duration::from_secs(26 * 3600);
        let issued = tokens.issue("u1", "user", Map::new(), then).unwrap();

        match tokens.refresh(&issued.token, SystemTime::now()) {
            Err(AppError::Auth(TokenError::TooOldToRefresh)) => {}
            other => panic!("Expected too-old error, got {other:?}"),
        }
    }

    #[test]
    fn test_refresh_rejects_bad_signature() {
        let tokens_a = TokenService::new(b"secret-A", Duration::from_secs(3600));
        let tokens_b = TokenService::new(b"secret-B", Duration::from_secs(3600));

        let issued = tokens_a
            .issue("u1", "user", Map::new(), SystemTime::now())
            .unwrap();

        match tokens_b.refresh(&issued.token, SystemTime::now()) {
            Err(AppError::Auth(TokenError::BadSignature)) => {}
            other => panic!("Expected bad-signature error, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let tokens = service();

        match tokens.validate("not-a-jwt") {
            Err(TokenError::Malformed(_)) => {}
            other => panic!("Expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_token_is_missing() {
        let tokens = service();
        assert_eq!(tokens.validate("Bearer "), Err(TokenError::Missing));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        let tokens = service();
        let now = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let claims = super::Claims {
            sub: "u1".to_string(),
            role: "user".to_string(),
            iat: now,
            exp: now + 3600,
            iss: "someone-else".to_string(),
            extra: Map::new(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test_secret_key_for_testing_purposes_only"),
        )
        .unwrap();

        match tokens.validate(&token) {
            Err(TokenError::Malformed(_)) => {}
            other => panic!("Expected malformed error, got {other:?}"),
        }
    }
}
