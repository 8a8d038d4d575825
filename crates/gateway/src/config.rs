/// Environment-level gateway configuration, resolved once at startup.
use secrecy::Secret;
use tracing::warn;

use recall_pipeline::credentials::CredentialPolicy;

const ENV_COMPLETION_KEY: &str = "OPENAI_API_KEY";
const ENV_STORE_KEY: &str = "PINECONE_API_KEY";
const ENV_REQUIRE_CLIENT_KEYS: &str = "REQUIRE_CLIENT_KEYS";

#[derive(Clone, Default)]
pub struct GatewayConfig {
    /// Fallback credentials and the policy for accepting caller keys.
    pub policy: CredentialPolicy,
    /// Endpoint overrides, primarily for tests; `None` means the client
    /// defaults.
    pub completion_base_url: Option<String>,
    pub embedding_base_url: Option<String>,
    pub store_base_url: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let policy = CredentialPolicy {
            require_caller_keys: std::env::var(ENV_REQUIRE_CLIENT_KEYS)
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            default_completion_key: read_key(ENV_COMPLETION_KEY),
            default_store_key: read_key(ENV_STORE_KEY),
        };

        if policy.default_completion_key.is_none() {
            warn!(
                "{ENV_COMPLETION_KEY} has not been provided in this deployment environment; \
                 the optional keys incoming from clients will be used, which is not recommended"
            );
        }

        Self {
            policy,
            ..Default::default()
        }
    }
}

fn read_key(name: &str) -> Option<Secret<String>> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Secret::new)
}
