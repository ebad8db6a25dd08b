use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::slice;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::User;

/// Access-token claims. Besides the registered fields they carry the
/// session's role and tenant so handlers never have to re-read the user
/// row for authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub bank_id: Option<Uuid>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(&self, user: &User) -> Result<String> {
        let issued_at = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            bank_id: user.bank_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp() as usize,
            exp: (issued_at + self.expiry).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(slice::from_ref(&self.issuer));
        validation.set_audience(slice::from_ref(&self.audience));
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}
