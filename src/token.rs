//! Manage json web tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::session::SessionError;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing, in seconds.
    pub exp: i64,
    /// Identifies the time at which the JWT was issued, in seconds.
    pub iat: i64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Absolute expiry in milliseconds since Unix epoch.
    pub fn expires_at_millis(&self) -> i64 {
        self.exp * 1000
    }
}

/// A freshly signed access token.
#[derive(Clone, Debug, PartialEq)]
pub struct IssuedToken {
    pub token: String,
    /// Absolute expiry in milliseconds since Unix epoch.
    pub expires_at: i64,
}

/// Sign and read access tokens with a server-held HMAC secret.
#[derive(Clone)]
pub struct TokenIssuer {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create a new [`TokenIssuer`].
    ///
    /// `ttl` is the access token lifetime in seconds.
    pub fn new(
        issuer: impl Into<String>,
        secret: impl AsRef<[u8]>,
        ttl: u64,
    ) -> Self {
        let issuer = issuer.into();
        let secret = secret.as_ref();

        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            audience: issuer.clone(),
            issuer,
            ttl: i64::try_from(ttl).unwrap_or(i64::MAX / 2_000),
        }
    }

    /// Set `audience` field on JWT.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Sign a token for `subject` carrying `roles`, issued at `now`.
    pub fn create_token(
        &self,
        subject: &str,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, SessionError> {
        let iat = now.timestamp();
        let claims = Claims {
            aud: self.audience.clone(),
            exp: iat + self.ttl,
            iat,
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            roles: roles.to_vec(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|err| SessionError::Internal(Box::new(err)))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at_millis(),
        })
    }

    /// Read the absolute expiry (milliseconds) of a token signed by us.
    ///
    /// Expired tokens still yield their expiry.
    pub fn expiry_of(&self, token: &str) -> Result<i64, SessionError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| SessionError::MalformedToken)?
            .claims;

        Ok(claims.expires_at_millis())
    }

    /// Decode and fully check a token.
    pub fn decode(&self, token: &str) -> Result<Claims, SessionError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    SessionError::TokenExpired
                },
                _ => SessionError::MalformedToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SECRET: &str = "a-very-long-test-signing-secret";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("https://auth.example.com/", SECRET, 900)
    }

    #[test]
    fn test_expiry_round_trip() {
        let issuer = issuer();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let roles = vec!["user".to_string(), "admin".to_string()];

        let issued = issuer.create_token("42", &roles, now).unwrap();

        assert_eq!(issued.expires_at, (1_700_000_000 + 900) * 1000);
        assert_eq!(issuer.expiry_of(&issued.token).unwrap(), issued.expires_at);
    }

    #[test]
    fn test_decode_claims() {
        let issuer = issuer();
        let roles = vec!["user".to_string()];
        let issued = issuer.create_token("42", &roles, Utc::now()).unwrap();

        let claims = issuer.decode(&issued.token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, "https://auth.example.com/");
        assert_eq!(claims.aud, "https://auth.example.com/");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer();
        let past = Utc::now() - chrono::Duration::hours(1);
        let issued = issuer.create_token("42", &[], past).unwrap();

        assert!(matches!(
            issuer.decode(&issued.token),
            Err(SessionError::TokenExpired)
        ));
        // Expiry remains readable.
        assert_eq!(issuer.expiry_of(&issued.token).unwrap(), issued.expires_at);
    }

    #[test]
    fn test_malformed_token() {
        let issuer = issuer();
        assert!(matches!(
            issuer.expiry_of("not.a.jwt"),
            Err(SessionError::MalformedToken)
        ));

        let other = TokenIssuer::new("https://auth.example.com/", "another-secret", 900);
        let forged = other.create_token("42", &[], Utc::now()).unwrap();
        assert!(matches!(
            issuer.expiry_of(&forged.token),
            Err(SessionError::MalformedToken)
        ));
        assert!(matches!(
            issuer.decode(&forged.token),
            Err(SessionError::MalformedToken)
        ));
    }

    #[test]
    fn test_wrong_audience() {
        let issued = issuer()
            .with_audience("api.example.com")
            .create_token("42", &[], Utc::now())
            .unwrap();

        assert!(issuer().decode(&issued.token).is_err());
        assert!(issuer().expiry_of(&issued.token).is_ok());
    }
}
