//! Auth resolver: realm, type and credentials for a gateway-class
//!
//! Authentication comes from mutually exclusive sources with strict
//! precedence: an external Secret reference, if set, overrides all inline
//! fields. Every failure here is critical; auth must never silently
//! degrade.

use kube::ResourceExt;

use crate::crd::GatewayConfig;
use crate::store::ResourceStore;

use super::artifact::AuthConfig;
use super::errors::CriticalError;

/// Resolved authentication type, after alias resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    /// Long-lived username/password pair
    Static,
    /// Time-windowed credentials derived from a shared secret
    Ephemeral,
}

impl AuthType {
    /// Resolve an auth type string, accepting the documented aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" | "plaintext" => Some(AuthType::Static),
            "ephemeral" | "longterm" | "timewindowed" => Some(AuthType::Ephemeral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Static => "static",
            AuthType::Ephemeral => "ephemeral",
        }
    }
}

/// Render the auth block of the artifact for one gateway-class.
pub fn render_auth(
    store: &ResourceStore,
    config: &GatewayConfig,
) -> Result<AuthConfig, CriticalError> {
    match &config.spec.auth_ref {
        Some(secret_ref) => render_external(store, config, secret_ref),
        None => render_inline(config),
    }
}

/// Whether any inline auth field is still present on the config.
fn inline_fields_set(config: &GatewayConfig) -> bool {
    config.spec.auth_type.is_some()
        || config.spec.username.is_some()
        || config.spec.password.is_some()
        || config.spec.shared_secret.is_some()
}

fn render_inline(config: &GatewayConfig) -> Result<AuthConfig, CriticalError> {
    let type_str = config.spec.auth_type.as_deref().ok_or_else(|| {
        CriticalError::InvalidAuthConfig("no authentication source configured".to_string())
    })?;
    let auth_type = AuthType::parse(type_str)
        .ok_or_else(|| CriticalError::UnknownAuthType(type_str.to_string()))?;

    let mut credentials = std::collections::BTreeMap::new();
    match auth_type {
        AuthType::Static => {
            let username = require_inline(config.spec.username.as_deref(), auth_type, "username")?;
            let password = require_inline(config.spec.password.as_deref(), auth_type, "password")?;
            credentials.insert("username".to_string(), username.to_string());
            credentials.insert("password".to_string(), password.to_string());
        }
        AuthType::Ephemeral => {
            let secret =
                require_inline(config.spec.shared_secret.as_deref(), auth_type, "secret")?;
            credentials.insert("secret".to_string(), secret.to_string());
        }
    }

    Ok(AuthConfig {
        realm: config.realm().to_string(),
        type_: auth_type.as_str().to_string(),
        credentials,
    })
}

fn require_inline<'a>(
    value: Option<&'a str>,
    auth_type: AuthType,
    field: &str,
) -> Result<&'a str, CriticalError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CriticalError::MissingAuthCredential {
            auth_type: auth_type.as_str().to_string(),
            field: field.to_string(),
        })
}

fn render_external(
    store: &ResourceStore,
    config: &GatewayConfig,
    secret_ref: &crate::crd::SecretReference,
) -> Result<AuthConfig, CriticalError> {
    let namespace = secret_ref
        .namespace
        .clone()
        .or_else(|| config.namespace())
        .unwrap_or_else(|| "default".to_string());
    let key = format!("{}/{}", namespace, secret_ref.name);

    let secret = store
        .secrets
        .get(Some(&namespace), &secret_ref.name)
        .ok_or_else(|| CriticalError::AuthSecretNotFound(key.clone()))?;

    let field = |name: &str| -> Result<Option<String>, CriticalError> {
        match secret.data.as_ref().and_then(|data| data.get(name)) {
            Some(bytes) => std::str::from_utf8(&bytes.0)
                .map(|s| Some(s.to_string()))
                .map_err(|_| {
                    CriticalError::InvalidAuthConfig(format!(
                        "field {name:?} of auth Secret {key} is not valid UTF-8"
                    ))
                }),
            None => Ok(None),
        }
    };

    let username = field("username")?;
    let password = field("password")?;
    let shared_secret = field("secret")?;

    // The Secret names its own type or the present fields determine it.
    let auth_type = match field("type")? {
        Some(type_str) => AuthType::parse(&type_str)
            .ok_or_else(|| CriticalError::UnknownAuthType(type_str.clone()))?,
        None => {
            if username.is_some() && password.is_some() {
                AuthType::Static
            } else if shared_secret.is_some() {
                AuthType::Ephemeral
            } else if inline_fields_set(config) {
                // The Secret decides nothing while inline fields linger:
                // refusing is safer than guessing which source was meant.
                return Err(CriticalError::MixedAuthCredentials);
            } else {
                return Err(CriticalError::InvalidAuthConfig(format!(
                    "auth Secret {key} does not determine an authentication type"
                )));
            }
        }
    };

    let mut credentials = std::collections::BTreeMap::new();
    match auth_type {
        AuthType::Static => {
            let username = require_external(username, config, auth_type, "username")?;
            let password = require_external(password, config, auth_type, "password")?;
            credentials.insert("username".to_string(), username);
            credentials.insert("password".to_string(), password);
        }
        AuthType::Ephemeral => {
            let secret = require_external(shared_secret, config, auth_type, "secret")?;
            credentials.insert("secret".to_string(), secret);
        }
    }

    let realm = field("realm")?.unwrap_or_else(|| config.realm().to_string());

    Ok(AuthConfig {
        realm,
        type_: auth_type.as_str().to_string(),
        credentials,
    })
}

fn require_external(
    value: Option<String>,
    config: &GatewayConfig,
    auth_type: AuthType,
    field: &str,
) -> Result<String, CriticalError> {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => Ok(v),
        // A readable Secret missing a required field while inline fields are
        // still set is an ambiguous mix of the two sources.
        None if inline_fields_set(config) => Err(CriticalError::MixedAuthCredentials),
        None => Err(CriticalError::MissingAuthCredential {
            auth_type: auth_type.as_str().to_string(),
            field: field.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::crd::{GatewayConfigSpec, SecretReference};

    fn store_with_secret(fields: &[(&str, &str)]) -> ResourceStore {
        let store = ResourceStore::default();
        let mut data = BTreeMap::new();
        for (k, v) in fields {
            data.insert(k.to_string(), ByteString(v.as_bytes().to_vec()));
        }
        let secret = Secret {
            metadata: kube::api::ObjectMeta {
                name: Some("auth".to_string()),
                namespace: Some("turngate".to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        store.secrets.upsert(secret);
        store
    }

    fn config(spec: GatewayConfigSpec) -> GatewayConfig {
        let mut config = GatewayConfig::new("config", spec);
        config.metadata.namespace = Some("turngate".to_string());
        config
    }

    fn auth_ref() -> Option<SecretReference> {
        Some(SecretReference {
            namespace: None,
            name: "auth".to_string(),
        })
    }

    #[test]
    fn inline_static_credentials() {
        let store = ResourceStore::default();
        let config = config(GatewayConfigSpec {
            auth_type: Some("plaintext".to_string()),
            username: Some("user-1".to_string()),
            password: Some("pass-1".to_string()),
            ..Default::default()
        });

        let auth = render_auth(&store, &config).unwrap();
        assert_eq!(auth.type_, "static");
        assert_eq!(auth.realm, "turngate.io");
        assert_eq!(auth.credentials.get("username").unwrap(), "user-1");
        assert_eq!(auth.credentials.get("password").unwrap(), "pass-1");
    }

    #[test]
    fn inline_ephemeral_aliases_resolve_before_requirement_checks() {
        let store = ResourceStore::default();
        for alias in ["ephemeral", "longterm", "timewindowed"] {
            let config = config(GatewayConfigSpec {
                auth_type: Some(alias.to_string()),
                shared_secret: Some("my-secret".to_string()),
                ..Default::default()
            });
            let auth = render_auth(&store, &config).unwrap();
            assert_eq!(auth.type_, "ephemeral");
            assert_eq!(auth.credentials.get("secret").unwrap(), "my-secret");
        }
    }

    #[test]
    fn external_secret_overrides_inline_fields() {
        let store = store_with_secret(&[
            ("type", "static"),
            ("username", "from-secret"),
            ("password", "secret-pass"),
        ]);
        let config = config(GatewayConfigSpec {
            auth_type: Some("static".to_string()),
            username: Some("inline-user".to_string()),
            password: Some("inline-pass".to_string()),
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let auth = render_auth(&store, &config).unwrap();
        assert_eq!(auth.credentials.get("username").unwrap(), "from-secret");
        assert_eq!(auth.credentials.get("password").unwrap(), "secret-pass");
    }

    #[test]
    fn incomplete_secret_with_inline_leftovers_is_mixed_auth() {
        // Secret declares static auth but carries no password; inline fields
        // are still present, so the sources are ambiguously mixed.
        let store = store_with_secret(&[("type", "static"), ("username", "from-secret")]);
        let config = config(GatewayConfigSpec {
            auth_type: Some("static".to_string()),
            password: Some("inline-pass".to_string()),
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let err = render_auth(&store, &config).unwrap_err();
        assert_eq!(err, CriticalError::MixedAuthCredentials);
    }

    #[test]
    fn incomplete_secret_without_inline_fields_is_missing_credential() {
        let store = store_with_secret(&[("type", "static"), ("username", "from-secret")]);
        let config = config(GatewayConfigSpec {
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let err = render_auth(&store, &config).unwrap_err();
        assert!(matches!(
            err,
            CriticalError::MissingAuthCredential { ref field, .. } if field == "password"
        ));
    }

    #[test]
    fn secret_type_is_inferred_from_present_fields() {
        let store = store_with_secret(&[("secret", "shared")]);
        let config = config(GatewayConfigSpec {
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let auth = render_auth(&store, &config).unwrap();
        assert_eq!(auth.type_, "ephemeral");
        assert_eq!(auth.credentials.get("secret").unwrap(), "shared");
    }

    #[test]
    fn unreadable_secret_is_critical() {
        let store = ResourceStore::default();
        let config = config(GatewayConfigSpec {
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let err = render_auth(&store, &config).unwrap_err();
        assert!(matches!(err, CriticalError::AuthSecretNotFound(_)));
    }

    #[test]
    fn unknown_type_is_critical() {
        let store = ResourceStore::default();
        let config = config(GatewayConfigSpec {
            auth_type: Some("oauth2".to_string()),
            ..Default::default()
        });

        let err = render_auth(&store, &config).unwrap_err();
        assert_eq!(err, CriticalError::UnknownAuthType("oauth2".to_string()));
    }

    #[test]
    fn no_auth_source_is_critical() {
        let store = ResourceStore::default();
        let config = config(GatewayConfigSpec::default());

        let err = render_auth(&store, &config).unwrap_err();
        assert!(matches!(err, CriticalError::InvalidAuthConfig(_)));
    }

    #[test]
    fn realm_from_secret_wins() {
        let store = store_with_secret(&[("secret", "shared"), ("realm", "media.example.com")]);
        let config = config(GatewayConfigSpec {
            realm: Some("config-realm".to_string()),
            auth_ref: auth_ref(),
            ..Default::default()
        });

        let auth = render_auth(&store, &config).unwrap();
        assert_eq!(auth.realm, "media.example.com");
    }
}
