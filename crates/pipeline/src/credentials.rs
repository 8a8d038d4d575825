/// Per-request credential resolution.
///
/// Caller-supplied keys win, process-wide defaults fill in, and anything
/// still missing fails synchronously before any network call is made.
use secrecy::Secret;

use crate::error::PipelineError;

/// Inbound field names, reported verbatim when a credential is missing.
pub const COMPLETION_KEY_FIELD: &str = "apiKey";
pub const STORE_KEY_FIELD: &str = "dbApiKey";

/// Process-wide fallback credentials and the policy for using them.
#[derive(Clone, Default)]
pub struct CredentialPolicy {
    /// When set, callers must supply their own keys and the server defaults
    /// are never consulted.
    pub require_caller_keys: bool,
    pub default_completion_key: Option<Secret<String>>,
    pub default_store_key: Option<Secret<String>>,
}

/// The two credentials the pipeline needs, fully resolved. `Secret`'s
/// `Debug` impl keeps the key material redacted.
#[derive(Clone, Debug)]
pub struct ResolvedCredentials {
    pub completion_key: Secret<String>,
    pub store_key: Secret<String>,
}

pub fn resolve_credentials(
    policy: &CredentialPolicy,
    caller_completion_key: Option<&str>,
    caller_store_key: Option<&str>,
) -> Result<ResolvedCredentials, PipelineError> {
    Ok(ResolvedCredentials {
        completion_key: resolve_one(
            policy,
            caller_completion_key,
            policy.default_completion_key.as_ref(),
            COMPLETION_KEY_FIELD,
        )?,
        store_key: resolve_one(
            policy,
            caller_store_key,
            policy.default_store_key.as_ref(),
            STORE_KEY_FIELD,
        )?,
    })
}

fn resolve_one(
    policy: &CredentialPolicy,
    caller: Option<&str>,
    fallback: Option<&Secret<String>>,
    field: &'static str,
) -> Result<Secret<String>, PipelineError> {
    if let Some(key) = caller.filter(|k| !k.is_empty()) {
        return Ok(Secret::new(key.to_string()));
    }
    if !policy.require_caller_keys {
        if let Some(key) = fallback {
            return Ok(key.clone());
        }
    }
    Err(PipelineError::MissingCredential(field))
}
