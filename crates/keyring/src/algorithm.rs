//! Pure mappings between JOSE algorithm identifiers, key-type tags, and the
//! key-generation tags the JWK generator understands.
//!
//! Every "unsupported algorithm" error in the service layer routes through
//! these functions rather than hard-coding algorithm strings locally.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "OKP")]
    Okp,
    #[serde(rename = "oct")]
    Oct,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
            KeyType::Okp => "OKP",
            KeyType::Oct => "oct",
        }
    }
}

/// `key_type_of(alg) -> {RSA, EC, OKP, oct, None}`.
///
/// Accepts JWS signature algorithms, JWE content-encryption identifiers, and
/// the key-type tags used as `ElasticJWK.algorithm` values (`RSA/2048`, ...).
pub fn key_type_of(alg: &str) -> Option<KeyType> {
    match alg {
        "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => Some(KeyType::Rsa),
        "ES256" | "ES384" | "ES512" => Some(KeyType::Ec),
        "EdDSA" => Some(KeyType::Okp),
        "HS256" | "HS384" | "HS512" => Some(KeyType::Oct),
        "A128GCM" | "A192GCM" | "A256GCM" => Some(KeyType::Oct),
        "A128CBC-HS256" | "A192CBC-HS384" | "A256CBC-HS512" => Some(KeyType::Oct),
        "RSA/2048" | "RSA/3072" | "RSA/4096" => Some(KeyType::Rsa),
        "EC/P256" | "EC/P384" | "EC/P521" => Some(KeyType::Ec),
        "OKP/Ed25519" => Some(KeyType::Okp),
        "oct/128" | "oct/192" | "oct/256" | "oct/384" | "oct/512" => Some(KeyType::Oct),
        _ => None,
    }
}

/// `sig_alg_of(alg) -> RFC 7518 JWS signature algorithm identifier`.
pub fn sig_alg_of(alg: &str) -> Option<&'static str> {
    match alg {
        "oct/256" => Some("HS256"),
        "oct/384" => Some("HS384"),
        "oct/512" => Some("HS512"),
        "RSA/2048" => Some("RS256"),
        "RSA/3072" => Some("RS384"),
        "RSA/4096" => Some("RS512"),
        "EC/P256" => Some("ES256"),
        "EC/P384" => Some("ES384"),
        "EC/P521" => Some("ES512"),
        "OKP/Ed25519" => Some("EdDSA"),
        // Already-canonical JWS identifiers pass through unchanged.
        "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" | "ES256" | "ES384" | "ES512"
        | "EdDSA" | "HS256" | "HS384" | "HS512" => Some(leak_canonical(alg)),
        _ => None,
    }
}

/// Returns a `'static` copy of an already-canonical alg string without allocating
/// for the fixed, known set of identifiers handled by [`sig_alg_of`].
fn leak_canonical(alg: &str) -> &'static str {
    match alg {
        "RS256" => "RS256",
        "RS384" => "RS384",
        "RS512" => "RS512",
        "PS256" => "PS256",
        "PS384" => "PS384",
        "PS512" => "PS512",
        "ES256" => "ES256",
        "ES384" => "ES384",
        "ES512" => "ES512",
        "EdDSA" => "EdDSA",
        "HS256" => "HS256",
        "HS384" => "HS384",
        "HS512" => "HS512",
        _ => unreachable!("leak_canonical called with non-canonical alg"),
    }
}

/// `jwe_pair_of(alg) -> (key_alg, content_enc)` for JWE.
pub fn jwe_pair_of(alg: &str) -> Option<(&'static str, &'static str)> {
    match alg {
        "RSA/2048" | "RSA/3072" | "RSA/4096" => Some(("RSA-OAEP-256", "A256GCM")),
        "EC/P256" | "EC/P384" | "EC/P521" => Some(("ECDH-ES+A256KW", "A256GCM")),
        "oct/128" => Some(("dir", "A128GCM")),
        "oct/192" => Some(("dir", "A192GCM")),
        "oct/256" => Some(("dir", "A256GCM")),
        "A128KW" => Some(("A128KW", "A128GCM")),
        "A192KW" => Some(("A192KW", "A192GCM")),
        "A256KW" => Some(("A256KW", "A256GCM")),
        "A128GCMKW" => Some(("A128GCMKW", "A128GCM")),
        "A192GCMKW" => Some(("A192GCMKW", "A192GCM")),
        "A256GCMKW" => Some(("A256GCMKW", "A256GCM")),
        _ => None,
    }
}

/// `gen_alg_of(alg)`: collapses equivalent JWS/JWE-facing inputs to the
/// canonical key-generation tag consumed by the JWK generator.
pub fn gen_alg_of(alg: &str) -> Option<&'static str> {
    match alg {
        "RS256" | "PS256" | "RSA/2048" => Some("RSA/2048"),
        "RS384" | "PS384" | "RSA/3072" => Some("RSA/3072"),
        "RS512" | "PS512" | "RSA/4096" => Some("RSA/4096"),
        "ES256" | "EC/P256" => Some("EC/P256"),
        "ES384" | "EC/P384" => Some("EC/P384"),
        "ES512" | "EC/P521" => Some("EC/P521"),
        "EdDSA" | "OKP/Ed25519" => Some("OKP/Ed25519"),
        "HS256" | "oct/256" | "A256GCM" => Some("oct/256"),
        "HS384" | "oct/384" => Some("oct/384"),
        "HS512" | "oct/512" => Some("oct/512"),
        "oct/128" | "A128GCM" => Some("oct/128"),
        "oct/192" | "A192GCM" => Some("oct/192"),
        _ => None,
    }
}

#[cfg(all(test, feature = "unit_test"))]
mod unit_test {
    use super::*;

    #[test]
    fn key_type_of_recognizes_all_families() {
        assert_eq!(key_type_of("RS256"), Some(KeyType::Rsa));
        assert_eq!(key_type_of("ES512"), Some(KeyType::Ec));
        assert_eq!(key_type_of("EdDSA"), Some(KeyType::Okp));
        assert_eq!(key_type_of("HS256"), Some(KeyType::Oct));
        assert_eq!(key_type_of("A256GCM"), Some(KeyType::Oct));
        assert_eq!(key_type_of("RSA/2048"), Some(KeyType::Rsa));
        assert_eq!(key_type_of("oct/512"), Some(KeyType::Oct));
        assert_eq!(key_type_of("bogus"), None);
    }

    #[test]
    fn sig_alg_of_maps_key_type_tags() {
        assert_eq!(sig_alg_of("oct/256"), Some("HS256"));
        assert_eq!(sig_alg_of("RSA/2048"), Some("RS256"));
        assert_eq!(sig_alg_of("EC/P384"), Some("ES384"));
        assert_eq!(sig_alg_of("OKP/Ed25519"), Some("EdDSA"));
        assert_eq!(sig_alg_of("RS256"), Some("RS256"));
        assert_eq!(sig_alg_of("bogus"), None);
    }

    #[test]
    fn jwe_pair_of_maps_key_families() {
        assert_eq!(jwe_pair_of("RSA/2048"), Some(("RSA-OAEP-256", "A256GCM")));
        assert_eq!(
            jwe_pair_of("EC/P256"),
            Some(("ECDH-ES+A256KW", "A256GCM"))
        );
        assert_eq!(jwe_pair_of("oct/256"), Some(("dir", "A256GCM")));
        assert_eq!(jwe_pair_of("bogus"), None);
    }

    #[test]
    fn gen_alg_of_collapses_equivalent_inputs() {
        assert_eq!(gen_alg_of("RS256"), Some("RSA/2048"));
        assert_eq!(gen_alg_of("RSA/2048"), Some("RSA/2048"));
        assert_eq!(gen_alg_of("ES256"), Some("EC/P256"));
        assert_eq!(gen_alg_of("HS256"), Some("oct/256"));
        assert_eq!(gen_alg_of("bogus"), None);
    }
}
