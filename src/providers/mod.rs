//! Provider subsystem for model inference backends.
//!
//! Every backend implements [`Provider`]: a request carrying history and tool
//! declarations in, content blocks out. [`ReliableProvider`] adds timeouts and
//! bounded retries on top of any backend.

pub mod compatible;
pub mod reliable;
pub mod traits;

pub use compatible::{AuthStyle, OpenAiCompatibleProvider};
pub use reliable::{ReliableProvider, RetryPolicy};
pub use traits::{ChatRequest, ChatResponse, Provider, ProviderError, ToolChoice};

use std::sync::Arc;

const MAX_API_ERROR_CHARS: usize = 200;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts OpenAI-style keys (`sk-`, `sk-proj-`), restricted keys (`rk-`)
/// and session tokens (`sess-`).
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["sk-", "rk-", "sess-"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Resolve API key for a provider from config and environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: Vec<&str> = match name {
        "openai" => vec!["OPENAI_API_KEY"],
        _ => vec![],
    };

    for env_var in provider_env_candidates
        .into_iter()
        .chain(["SWITCHYARD_API_KEY", "API_KEY"])
    {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the right provider from its config name.
///
/// `"openai"` targets the public API (or `api_url` when given);
/// `"custom:<url>"` targets any OpenAI-compatible endpoint.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Arc<dyn Provider>> {
    let key = resolve_provider_credential(name, api_key);

    match name {
        "openai" => Ok(Arc::new(OpenAiCompatibleProvider::new(
            "openai",
            api_url.unwrap_or(OPENAI_BASE_URL),
            key.as_deref(),
            AuthStyle::Bearer,
        ))),
        custom if custom.starts_with("custom:") => {
            let url = custom.trim_start_matches("custom:").trim();
            if url.is_empty() {
                anyhow::bail!("Custom provider requires a URL, e.g. custom:https://host/v1");
            }
            Ok(Arc::new(OpenAiCompatibleProvider::new(
                "custom",
                url,
                key.as_deref(),
                AuthStyle::Bearer,
            )))
        }
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: \"openai\", \"custom:<URL>\"."
        ),
    }
}

/// Create a provider wrapped with timeout and retry behavior.
pub fn create_resilient_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
    policy: RetryPolicy,
) -> anyhow::Result<Arc<dyn Provider>> {
    let inner = create_provider(name, api_key, api_url)?;
    Ok(Arc::new(ReliableProvider::new(inner, policy)))
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Whether the provider runs locally (no API key required)
    pub local: bool,
}

pub fn list_providers() -> Vec<ProviderInfo> {
    vec![ProviderInfo {
        name: "openai",
        display_name: "OpenAI",
        local: false,
    }]
}
