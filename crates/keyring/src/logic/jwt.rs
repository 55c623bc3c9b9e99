//! JWT Service (spec component 4.6): signed-JWT issuance/validation, and
//! nested signed-then-encrypted JWTs built on top of [`JwsService`]/[`JweService`].

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use encryption::Barrier;
use josekit::jws::JwsHeader;
use serde_json::Value;
use shared::primitives::WrappedUuidV4;

use crate::error::{KeyringError, KeyringResult};
use crate::logic::codec::decrypt_material_bytes;
use crate::logic::jwe::JweService;
use crate::logic::jws::{check_compact_jws_shape, jws_algorithm};
use crate::repository::{ElasticJwkRepositoryLike, MaterialJwkRepositoryLike};
use crate::types::{ElasticJwk, KeyUse};

const NESTED_JWT_CONTENT_TYPE: &str = "JWT";

/// Registered claims (RFC 7519) plus whatever custom claims the caller adds.
///
/// Parsing is tolerant on validate: a registered claim carrying a value of
/// the wrong JSON type is not a hard failure — it is dropped from the typed
/// field and surfaces, raw, under the same name in [`Claims::custom`].
/// Numeric time claims accept either a JSON number or a decimal-string form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<Vec<String>>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
    pub jti: Option<String>,
    pub custom: serde_json::Map<String, Value>,
}

fn parse_time_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

impl Claims {
    /// `aud` is serialized as a single string when it has exactly one
    /// element, otherwise as a string array.
    pub fn to_json(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        if let Some(iss) = &self.iss {
            map.insert("iss".to_string(), Value::String(iss.clone()));
        }
        if let Some(sub) = &self.sub {
            map.insert("sub".to_string(), Value::String(sub.clone()));
        }
        if let Some(aud) = &self.aud {
            let value = if aud.len() == 1 {
                Value::String(aud[0].clone())
            } else {
                Value::Array(aud.iter().cloned().map(Value::String).collect())
            };
            map.insert("aud".to_string(), value);
        }
        if let Some(exp) = self.exp {
            map.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(nbf) = self.nbf {
            map.insert("nbf".to_string(), Value::from(nbf));
        }
        if let Some(iat) = self.iat {
            map.insert("iat".to_string(), Value::from(iat));
        }
        if let Some(jti) = &self.jti {
            map.insert("jti".to_string(), Value::String(jti.clone()));
        }
        for (k, v) in &self.custom {
            map.insert(k.clone(), v.clone());
        }
        map
    }

    pub fn from_json(mut map: serde_json::Map<String, Value>) -> Claims {
        let mut claims = Claims::default();
        let mut custom = serde_json::Map::new();

        for key in ["iss", "sub", "jti"] {
            if let Some(v) = map.remove(key) {
                match v {
                    Value::String(s) => match key {
                        "iss" => claims.iss = Some(s),
                        "sub" => claims.sub = Some(s),
                        "jti" => claims.jti = Some(s),
                        _ => unreachable!(),
                    },
                    other => {
                        custom.insert(key.to_string(), other);
                    }
                }
            }
        }

        if let Some(v) = map.remove("aud") {
            match v {
                Value::String(s) => claims.aud = Some(vec![s]),
                Value::Array(items) => {
                    let strings: Option<Vec<String>> = items
                        .iter()
                        .map(|item| item.as_str().map(str::to_string))
                        .collect();
                    match strings {
                        Some(strings) => claims.aud = Some(strings),
                        None => {
                            custom.insert("aud".to_string(), Value::Array(items));
                        }
                    }
                }
                other => {
                    custom.insert("aud".to_string(), other);
                }
            }
        }

        for key in ["exp", "nbf", "iat"] {
            if let Some(v) = map.remove(key) {
                match parse_time_value(&v) {
                    Some(t) => match key {
                        "exp" => claims.exp = Some(t),
                        "nbf" => claims.nbf = Some(t),
                        "iat" => claims.iat = Some(t),
                        _ => unreachable!(),
                    },
                    None => {
                        custom.insert(key.to_string(), v);
                    }
                }
            }
        }

        custom.extend(map);
        claims.custom = custom;
        claims
    }
}

fn peek_header_kid(compact: &str) -> KeyringResult<Option<String>> {
    let header_b64 = compact
        .split('.')
        .next()
        .ok_or_else(|| KeyringError::ParseFailed("missing JWS header segment".to_string()))?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| KeyringError::ParseFailed(format!("invalid JWS header: {e}")))?;
    let header: Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| KeyringError::ParseFailed(format!("invalid JWS header json: {e}")))?;
    Ok(header
        .get("kid")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[derive(Clone)]
pub struct JwtService<Repo> {
    repo: Repo,
    barrier: Arc<dyn Barrier>,
    jwe: JweService<Repo>,
}

impl<Repo> JwtService<Repo>
where
    Repo: ElasticJwkRepositoryLike + MaterialJwkRepositoryLike + Clone,
{
    pub fn new(repo: Repo, barrier: Arc<dyn Barrier>) -> Self {
        let jwe = JweService::new(repo.clone(), barrier.clone());
        Self { repo, barrier, jwe }
    }

    async fn load_elastic_for_sig(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
    ) -> KeyringResult<ElasticJwk> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }
        if elastic.r#use != KeyUse::Sig.as_str() {
            return Err(KeyringError::WrongKeyUse);
        }
        Ok(elastic)
    }

    /// `CreateJWT(tenant, signing_elastic_id, claims) -> signed_jwt`.
    ///
    /// Unlike [`JwsService::sign`], the signature algorithm is the elastic
    /// key's `algorithm` taken directly, not routed through `sig_alg_of`:
    /// elastic keys backing JWT issuance are created with an
    /// already-canonical JWS algorithm identifier (e.g. `RS256`).
    pub async fn create_jwt(
        &self,
        tenant: &WrappedUuidV4,
        signing_elastic_id: &WrappedUuidV4,
        claims: &Claims,
    ) -> KeyringResult<String> {
        let elastic = self.load_elastic_for_sig(tenant, signing_elastic_id).await?;
        let material = self
            .repo
            .get_active_material(signing_elastic_id)
            .await?
            .ok_or(KeyringError::NoActiveMaterial)?;

        let private_jwk =
            decrypt_material_bytes(&material.private_jwk_jwe, self.barrier.as_ref()).await?;
        let algorithm = jws_algorithm(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;
        let signer = algorithm
            .signer_from_jwk(&private_jwk)
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;

        let mut header = JwsHeader::new();
        header.set_key_id(&material.material_kid);
        header.set_algorithm(&elastic.algorithm);
        header.set_token_type("JWT");

        let payload = serde_json::to_vec(&claims.to_json())
            .map_err(|e| KeyringError::ParseFailed(format!("invalid claims: {e}")))?;

        josekit::jws::serialize_compact(&payload, &header, signer.as_ref())
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))
    }

    /// `ValidateJWT(tenant, elastic_id, token) -> claims`.
    pub async fn validate_jwt(
        &self,
        tenant: &WrappedUuidV4,
        elastic_id: &WrappedUuidV4,
        token: &str,
    ) -> KeyringResult<Claims> {
        let elastic = self
            .repo
            .get_by_id(elastic_id)
            .await?
            .ok_or(KeyringError::NotFound)?;
        if &elastic.tenant_id != tenant {
            return Err(KeyringError::NotFound);
        }

        check_compact_jws_shape(token)?;

        let algorithm = jws_algorithm(&elastic.algorithm)
            .ok_or_else(|| KeyringError::UnsupportedAlgorithm(elastic.algorithm.clone()))?;

        let material = match peek_header_kid(token)? {
            Some(kid) => {
                let material = self
                    .repo
                    .get_by_material_kid(&kid)
                    .await?
                    .ok_or(KeyringError::NotFound)?;
                if &material.elastic_jwk_id != elastic_id {
                    return Err(KeyringError::MaterialKidDoesNotBelongToThisElasticJwk);
                }
                material
            }
            None => self
                .repo
                .get_active_material(elastic_id)
                .await?
                .ok_or(KeyringError::NoActiveMaterial)?,
        };

        let public_jwk =
            decrypt_material_bytes(&material.public_jwk_jwe, self.barrier.as_ref()).await?;
        let verifier = algorithm
            .verifier_from_jwk(&public_jwk)
            .map_err(|e| KeyringError::ParseFailed(e.to_string()))?;

        let (payload, _header) = josekit::jws::deserialize_compact(token, verifier.as_ref())
            .map_err(|e| KeyringError::JwtValidationFailed(e.to_string()))?;

        let claim_map: serde_json::Map<String, Value> = serde_json::from_slice(&payload)
            .map_err(|e| KeyringError::JwtValidationFailed(format!("invalid claim map: {e}")))?;
        let claims = Claims::from_json(claim_map);

        let now = chrono::Utc::now().timestamp();
        if let Some(exp) = claims.exp {
            if exp <= now {
                return Err(KeyringError::Expired);
            }
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now {
                return Err(KeyringError::NotYetValid);
            }
        }

        Ok(claims)
    }

    /// `CreateEncryptedJWT(tenant, signing_id, encryption_id, claims) -> compact_jwe`.
    pub async fn create_encrypted_jwt(
        &self,
        tenant: &WrappedUuidV4,
        signing_elastic_id: &WrappedUuidV4,
        encryption_elastic_id: &WrappedUuidV4,
        claims: &Claims,
    ) -> KeyringResult<String> {
        let signed = self.create_jwt(tenant, signing_elastic_id, claims).await?;

        let encryption_elastic = self
            .repo
            .get_by_id(encryption_elastic_id)
            .await?
            .ok_or(KeyringError::EncryptionKeyNotFound)?;
        if &encryption_elastic.tenant_id != tenant {
            return Err(KeyringError::EncryptionKeyNotFound);
        }
        if encryption_elastic.r#use != KeyUse::Enc.as_str() {
            return Err(KeyringError::WrongKeyUse);
        }

        self.jwe
            .encrypt_with_content_type(
                tenant,
                encryption_elastic_id,
                signed.as_bytes(),
                NESTED_JWT_CONTENT_TYPE,
            )
            .await
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;
    use crate::jwk_generator::JosekitJwkGenerator;
    use crate::logic::elastic_jwk::ElasticJwkService;
    use crate::test::fixtures::setup_test_repo;
    use encryption::AesGcmBarrier;

    async fn services() -> (
        ElasticJwkService<crate::repository::Repository>,
        JwtService<crate::repository::Repository>,
    ) {
        let repo = setup_test_repo().await;
        let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
        let generator: Arc<dyn crate::jwk_generator::JwkGenerator> =
            Arc::new(JosekitJwkGenerator::new());
        (
            ElasticJwkService::new(repo.clone(), barrier.clone(), generator),
            JwtService::new(repo, barrier),
        )
    }

    #[tokio::test]
    async fn create_then_validate_round_trips_registered_claims() {
        let (elastic_svc, jwt_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let claims = Claims {
            iss: Some("issuer".to_string()),
            sub: Some("subject".to_string()),
            jti: Some("token-id".to_string()),
            exp: Some(chrono::Utc::now().timestamp() + 3600),
            ..Default::default()
        };

        let token = jwt_svc.create_jwt(&tenant, &elastic.id, &claims).await.unwrap();
        let validated = jwt_svc
            .validate_jwt(&tenant, &elastic.id, &token)
            .await
            .unwrap();

        assert_eq!(validated.iss, claims.iss);
        assert_eq!(validated.sub, claims.sub);
        assert_eq!(validated.jti, claims.jti);
    }

    #[tokio::test]
    async fn validate_rejects_expired_token() {
        let (elastic_svc, jwt_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let claims = Claims {
            iss: Some("issuer".to_string()),
            exp: Some(chrono::Utc::now().timestamp() - 3600),
            ..Default::default()
        };

        let token = jwt_svc.create_jwt(&tenant, &elastic.id, &claims).await.unwrap();
        let err = jwt_svc
            .validate_jwt(&tenant, &elastic.id, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::Expired));
    }

    #[tokio::test]
    async fn validate_rejects_not_yet_valid_token() {
        let (elastic_svc, jwt_svc) = services().await;
        let tenant = WrappedUuidV4::new();
        let (elastic, _) = elastic_svc
            .create_elastic_jwk(&tenant, "RS256", "sig", 10)
            .await
            .unwrap();

        let claims = Claims {
            nbf: Some(chrono::Utc::now().timestamp() + 3600),
            ..Default::default()
        };

        let token = jwt_svc.create_jwt(&tenant, &elastic.id, &claims).await.unwrap();
        let err = jwt_svc
            .validate_jwt(&tenant, &elastic.id, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyringError::NotYetValid));
    }

    #[test]
    fn claims_round_trip_tolerates_decimal_string_times() {
        let mut map = serde_json::Map::new();
        map.insert("exp".to_string(), Value::String("1700000000".to_string()));
        map.insert("aud".to_string(), Value::String("single-audience".to_string()));
        map.insert("weird".to_string(), Value::Bool(true));

        let claims = Claims::from_json(map);
        assert_eq!(claims.exp, Some(1700000000));
        assert_eq!(claims.aud, Some(vec!["single-audience".to_string()]));
        assert_eq!(claims.custom.get("weird"), Some(&Value::Bool(true)));
    }

    #[test]
    fn claims_drops_wrong_typed_registered_claim_into_custom() {
        let mut map = serde_json::Map::new();
        map.insert("sub".to_string(), Value::Number(42.into()));

        let claims = Claims::from_json(map);
        assert_eq!(claims.sub, None);
        assert_eq!(claims.custom.get("sub"), Some(&Value::Number(42.into())));
    }
}
