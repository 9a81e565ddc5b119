// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication ID token verification.
//!
//! ID tokens are RS256 JWTs signed by the `securetoken` service account.
//! Its public keys are fetched as a JWKS and cached for as long as the
//! response's `Cache-Control: max-age` allows.

use crate::config::Config;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Caller identity extracted from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Firebase UID
    pub uid: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl AuthUser {
    /// A caller with neither an email nor a phone number is anonymous.
    pub fn is_anonymous(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.is_empty());
        blank(&self.email) && blank(&self.phone_number)
    }
}

/// Token verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The token is missing, malformed, expired or issued for another project.
    #[error("{0}")]
    Rejected(String),
    /// Signing keys could not be fetched.
    #[error("{0}")]
    Transient(String),
}

#[derive(Clone)]
enum VerifierMode {
    Google,
    StaticKey {
        kid: String,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Firebase-issued ID tokens.
pub struct FirebaseTokenVerifier {
    http_client: reqwest::Client,
    project_id: String,
    expected_issuer: String,
    mode: VerifierMode,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl FirebaseTokenVerifier {
    /// Create a production verifier that fetches and caches the securetoken JWKS.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let verifier = Self::with_mode(config, VerifierMode::Google)?;

        tracing::info!(
            project = %verifier.project_id,
            issuer = %verifier.expected_issuer,
            "Initialized Firebase ID token verifier"
        );

        Ok(verifier)
    }

    /// Create a verifier with a static RSA public key.
    ///
    /// This is intended for deterministic local/integration tests.
    pub fn new_with_static_key(
        config: &Config,
        kid: impl Into<String>,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static key kid must not be empty");
        }

        Self::with_mode(
            config,
            VerifierMode::StaticKey {
                kid,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_mode(config: &Config, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        let project_id = config.firebase_project_id.clone();
        let expected_issuer = format!("https://securetoken.google.com/{}", project_id);

        Ok(Self {
            http_client,
            project_id,
            expected_issuer,
            mode,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify a raw ID token and return the caller it identifies.
    pub async fn verify_id_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Rejected("ID token is empty".to_string()));
        }

        let header = decode_header(token)
            .map_err(|e| AuthError::Rejected(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Rejected(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthError::Rejected("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[self.expected_issuer.as_str()]);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<FirebaseIdTokenClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| AuthError::Rejected(format!("JWT validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;

        if claims.sub.is_empty() || claims.sub.len() > 128 {
            return Err(AuthError::Rejected("invalid subject claim".to_string()));
        }

        tracing::debug!(
            uid = %claims.sub,
            provider = claims
                .firebase
                .as_ref()
                .and_then(|f| f.sign_in_provider.as_deref())
                .unwrap_or("<unknown>"),
            "Verified Firebase ID token"
        );

        Ok(AuthUser {
            uid: claims.sub,
            email: claims.email,
            phone_number: claims.phone_number,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, AuthError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }
            return Err(AuthError::Rejected(format!(
                "unknown JWT kid for static verifier: {kid}"
            )));
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // Keys rotate; an unknown kid forces one refetch.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(AuthError::Rejected(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        tracing::debug!("Refreshing securetoken JWKS cache");

        let response = self
            .http_client
            .get(SECURETOKEN_JWKS_URL)
            .send()
            .await
            .map_err(|e| AuthError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(AuthError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Securetoken JWKS cache refreshed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirebaseIdTokenClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    phone_number: Option<String>,
    firebase: Option<FirebaseClaim>,
}

#[derive(Debug, Deserialize)]
struct FirebaseClaim {
    sign_in_provider: Option<String>,
}

/// RS256 signing keys from a JWKS, indexed by kid.
fn usable_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn validate_iat(iat: Option<usize>) -> Result<(), AuthError> {
    let Some(iat) = iat else {
        return Err(AuthError::Rejected("missing iat claim".to_string()));
    };

    if iat as u64 > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(AuthError::Rejected("iat claim is in the future".to_string()));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
