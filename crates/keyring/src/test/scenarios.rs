//! End-to-end scenarios wiring every sub-service behind [`KeyringService`]
//! together, the way a caller outside this crate is expected to exercise it.
//!
//! Each test below corresponds to one of the concrete scenarios the service
//! layer is contracted against: rotation preserving old artifacts, KID
//! lookups rejecting cross-elastic-key material, and JWKS publication
//! gracefully skipping a corrupted key.

use std::sync::Arc;

use encryption::{AesGcmBarrier, Barrier};

use crate::error::KeyringError;
use crate::jwk_generator::JosekitJwkGenerator;
use crate::repository::{MaterialJwkRepositoryLike, Repository};
use crate::service::{KeyringService, KeyringServiceParams};
use crate::test::fixtures::setup_test_repo;
use crate::types::MaterialJwk;
use shared::primitives::WrappedUuidV4;

async fn harness() -> (KeyringService<Repository>, Repository) {
    let repository = setup_test_repo().await;
    let barrier: Arc<dyn Barrier> = Arc::new(AesGcmBarrier::generate());
    let generator = Arc::new(JosekitJwkGenerator::new());
    let service = KeyringService::new(KeyringServiceParams {
        repository: repository.clone(),
        barrier,
        generator,
    });
    (service, repository)
}

/// Sign/verify with RS256, then confirm a swapped public ciphertext
/// yields `NoMatchingKeyFound` rather than a false-positive verification.
#[tokio::test]
async fn test_sign_verify_rejects_swapped_key() {
    let (svc, repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, material) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    let jws = svc
        .jws
        .sign(&tenant, &elastic.id, b"payload-bytes")
        .await
        .unwrap();
    let payload = svc.jws.verify(&tenant, &elastic.id, &jws).await.unwrap();
    assert_eq!(payload, b"payload-bytes");

    let (_other_elastic, other_material) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    let tampered = MaterialJwk {
        public_jwk_jwe: other_material.public_jwk_jwe.clone(),
        ..material
    };
    repo.delete(&tampered.id).await.unwrap();
    repo.create(&tampered).await.unwrap();

    let err = svc.jws.verify(&tenant, &elastic.id, &jws).await.unwrap_err();
    assert!(matches!(err, KeyringError::NoMatchingKeyFound));
}

/// Encrypt/decrypt round-trip on a symmetric (`oct/256`) key.
#[tokio::test]
async fn test_symmetric_encrypt_decrypt_round_trips() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "oct/256", "enc", 10)
        .await
        .unwrap();

    let jwe = svc
        .jwe
        .encrypt(&tenant, &elastic.id, b"secret message for symmetric key")
        .await
        .unwrap();
    let plaintext = svc.jwe.decrypt(&tenant, &elastic.id, &jwe).await.unwrap();
    assert_eq!(plaintext, b"secret message for symmetric key");
}

/// Rotation preserves the ability to verify artifacts signed by the
/// prior active material, and the newly active material signs fresh ones.
#[tokio::test]
async fn test_rotation_preserves_old_artifacts() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, _m1) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 5)
        .await
        .unwrap();

    let old_jws = svc.jws.sign(&tenant, &elastic.id, b"p").await.unwrap();

    let m2 = svc
        .material_rotation
        .rotate_material(&tenant, &elastic.id)
        .await
        .unwrap();
    assert!(m2.active);

    let payload = svc.jws.verify(&tenant, &elastic.id, &old_jws).await.unwrap();
    assert_eq!(payload, b"p");

    let new_jws = svc.jws.sign(&tenant, &elastic.id, b"q").await.unwrap();
    let payload = svc.jws.verify(&tenant, &elastic.id, &new_jws).await.unwrap();
    assert_eq!(payload, b"q");
}

/// Rotation beyond `max_materials` fails with `MaxMaterialsReached`.
#[tokio::test]
async fn test_rotation_enforces_max_materials() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 2)
        .await
        .unwrap();

    svc.material_rotation
        .rotate_material(&tenant, &elastic.id)
        .await
        .unwrap();

    let err = svc
        .material_rotation
        .rotate_material(&tenant, &elastic.id)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::MaxMaterialsReached));
}

/// `SignWithKID`/`EncryptWithKID` reject a KID that belongs to a
/// different elastic key.
#[tokio::test]
async fn test_sign_and_encrypt_with_kid_reject_cross_elastic_key() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (e1, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();
    let (_e2, m2) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    let err = svc
        .jws
        .sign_with_kid(&tenant, &e1.id, &m2.material_kid, b"payload")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyringError::MaterialKeyDoesNotBelongToElasticJwk
    ));

    let (enc1, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RSA/2048", "enc", 10)
        .await
        .unwrap();
    let (_enc2, enc_m2) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RSA/2048", "enc", 10)
        .await
        .unwrap();

    let err = svc
        .jwe
        .encrypt_with_kid(&tenant, &enc1.id, &enc_m2.material_kid, b"data")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyringError::MaterialKeyDoesNotBelongToElasticJwk
    ));
}

/// An already-expired claim set fails validation with `Expired`.
#[tokio::test]
async fn test_expired_jwt_is_rejected() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    let claims = crate::logic::jwt::Claims {
        iss: Some("x".to_string()),
        exp: Some(chrono::Utc::now().timestamp() - 3600),
        ..Default::default()
    };

    let token = svc.jwt.create_jwt(&tenant, &elastic.id, &claims).await.unwrap();
    let err = svc
        .jwt
        .validate_jwt(&tenant, &elastic.id, &token)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::Expired));
}

/// `GetJWKS` skips a corrupted material rather than failing the whole
/// tenant's key set, while the strict single-key lookup still reports it.
#[tokio::test]
async fn test_jwks_skips_corrupted_material() {
    let (svc, repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    svc.elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();
    let (_corrupted_elastic, corrupted_material) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    let mut broken = corrupted_material.clone();
    broken.public_jwk_jwe = "not-valid-base64-!!!".to_string();
    repo.delete(&broken.id).await.unwrap();
    repo.create(&broken).await.unwrap();

    let keys = svc.jwks.get_jwks(&tenant).await.unwrap();
    assert_eq!(keys.len(), 1);

    let err = svc
        .jwks
        .get_public_jwk(&tenant, &corrupted_material.material_kid)
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::DecodeFailed(_)));
}

/// Disabling audit for an operation suppresses the entry entirely.
#[tokio::test]
async fn test_audit_suppression_when_disabled() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    svc.audit_log
        .update_audit_config(
            &tenant,
            crate::types::AuditConfig {
                tenant_id: tenant.clone(),
                operation: "sign".to_string(),
                enabled: false,
                sampling_rate: 0.0,
            },
        )
        .await
        .unwrap();

    svc.audit_log
        .log_operation(&tenant, None, "sign", "req-1", true, None)
        .await
        .unwrap();

    let page = shared::primitives::PageRequest {
        offset: 0,
        limit: 10,
    };
    let logs = svc.audit_log.list_audit_logs(&tenant, &page).await.unwrap();
    assert_eq!(logs.items.len(), 0);
}

/// Tenant isolation holds across every sub-service, not just
/// `ElasticJwkService`.
#[tokio::test]
async fn test_tenant_isolation_across_services() {
    let (svc, _repo) = harness().await;
    let tenant_a = WrappedUuidV4::new();
    let tenant_b = WrappedUuidV4::new();

    let (elastic, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant_a, "RS256", "sig", 10)
        .await
        .unwrap();

    assert!(matches!(
        svc.jws.sign(&tenant_b, &elastic.id, b"x").await.unwrap_err(),
        KeyringError::NotFound
    ));
    assert!(matches!(
        svc.material_rotation
            .rotate_material(&tenant_b, &elastic.id)
            .await
            .unwrap_err(),
        KeyringError::NotFound
    ));
    assert!(matches!(
        svc.jwks
            .get_jwks_for_elastic_key(&tenant_b, &elastic.id)
            .await
            .unwrap_err(),
        KeyringError::NotFound
    ));
}

/// Nested signed-then-encrypted JWT: validate the inner token after
/// decrypting the outer JWE.
#[tokio::test]
async fn create_encrypted_jwt_then_decrypt_and_validate() {
    let (svc, _repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (signing, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();
    let (encryption, _) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RSA/2048", "enc", 10)
        .await
        .unwrap();

    let claims = crate::logic::jwt::Claims {
        iss: Some("issuer".to_string()),
        sub: Some("subject".to_string()),
        ..Default::default()
    };

    let nested = svc
        .jwt
        .create_encrypted_jwt(&tenant, &signing.id, &encryption.id, &claims)
        .await
        .unwrap();

    let inner = svc
        .jwe
        .decrypt(&tenant, &encryption.id, &nested)
        .await
        .unwrap();
    let inner_jws = String::from_utf8(inner).unwrap();

    let validated = svc
        .jwt
        .validate_jwt(&tenant, &signing.id, &inner_jws)
        .await
        .unwrap();
    assert_eq!(validated.iss, claims.iss);
    assert_eq!(validated.sub, claims.sub);
}

/// Deleting an elastic key cascades to its materials.
#[tokio::test]
async fn test_delete_cascades_materials() {
    let (svc, repo) = harness().await;
    let tenant = WrappedUuidV4::new();

    let (elastic, material) = svc
        .elastic_jwk
        .create_elastic_jwk(&tenant, "RS256", "sig", 10)
        .await
        .unwrap();

    svc.elastic_jwk
        .delete_elastic_jwk(&tenant, &elastic.id)
        .await
        .unwrap();

    assert!(matches!(
        svc.elastic_jwk
            .get_elastic_jwk(&tenant, &elastic.id)
            .await
            .unwrap_err(),
        KeyringError::NotFound
    ));
    assert!(repo.get_by_id(&material.id).await.unwrap().is_none());
}
