//! Harness configuration read from the environment.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::Provider;

/// Default MCP endpoint for tool-augmented runs.
pub const DEFAULT_MCP_SERVER_URL: &str = "https://mcp.clerk.dev/mcp";

/// Default judge model.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4.1";

/// API key and endpoint for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable the key is read from.
    pub key_var: &'static str,
}

fn key_var(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::Google => "GOOGLE_GENERATIVE_AI_API_KEY",
        Provider::Vercel => "VERCEL_API_KEY",
    }
}

fn base_url_var(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_BASE_URL",
        Provider::Anthropic => "ANTHROPIC_BASE_URL",
        Provider::Google => "GOOGLE_BASE_URL",
        Provider::Vercel => "VERCEL_BASE_URL",
    }
}

/// Requests-per-minute budget per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    rpm: HashMap<Provider, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let rpm = HashMap::from([
            (Provider::OpenAi, 500),
            (Provider::Anthropic, 5),
            (Provider::Vercel, 10),
        ]);
        Self { rpm }
    }
}

impl RateLimitConfig {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            rpm: HashMap::new(),
        }
    }

    /// Defaults, overridden by:
    /// - OPENAI_RATE_LIMIT_RPM (default 500)
    /// - ANTHROPIC_RATE_LIMIT_RPM (default 5)
    /// - VERCEL_RATE_LIMIT_RPM (default 10)
    ///
    /// Unparseable or zero values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        for (provider, var) in [
            (Provider::OpenAi, "OPENAI_RATE_LIMIT_RPM"),
            (Provider::Anthropic, "ANTHROPIC_RATE_LIMIT_RPM"),
            (Provider::Vercel, "VERCEL_RATE_LIMIT_RPM"),
        ] {
            if let Some(rpm) = lookup(var)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|rpm| *rpm > 0)
            {
                config.rpm.insert(provider, rpm);
            }
        }
        config
    }

    pub fn with_rpm(mut self, provider: Provider, rpm: u32) -> Self {
        if rpm > 0 {
            self.rpm.insert(provider, rpm);
        }
        self
    }

    pub fn rpm(&self, provider: Provider) -> Option<u32> {
        self.rpm.get(&provider).copied()
    }

    /// Minimum spacing between calls, `ceil(60_000 / rpm)` ms.
    pub fn interval(&self, provider: Provider) -> Option<Duration> {
        self.rpm(provider)
            .map(|rpm| Duration::from_millis(60_000_u64.div_ceil(u64::from(rpm))))
    }
}

/// Process-wide configuration, built once and passed explicitly.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    credentials: HashMap<Provider, ProviderCredentials>,
    pub mcp_server_url: String,
    pub judge_model: String,
    pub rate_limits: RateLimitConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            credentials: HashMap::new(),
            mcp_server_url: DEFAULT_MCP_SERVER_URL.to_string(),
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_GENERATIVE_AI_API_KEY, VERCEL_API_KEY
    /// - OPENAI_BASE_URL, ANTHROPIC_BASE_URL, GOOGLE_BASE_URL, VERCEL_BASE_URL (optional)
    /// - MCP_SERVER_URL_OVERRIDE (optional, default: "https://mcp.clerk.dev/mcp")
    /// - FWEVAL_JUDGE_MODEL (optional, default: "gpt-4.1")
    /// - *_RATE_LIMIT_RPM, see [`RateLimitConfig::from_env`]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let credentials = Provider::ALL
            .into_iter()
            .map(|p| {
                (
                    p,
                    ProviderCredentials {
                        api_key: non_empty(key_var(p)),
                        base_url: non_empty(base_url_var(p)),
                        key_var: key_var(p),
                    },
                )
            })
            .collect();

        Self {
            credentials,
            mcp_server_url: non_empty("MCP_SERVER_URL_OVERRIDE")
                .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string()),
            judge_model: non_empty("FWEVAL_JUDGE_MODEL")
                .unwrap_or_else(|| DEFAULT_JUDGE_MODEL.to_string()),
            rate_limits: RateLimitConfig::from_lookup(&lookup),
        }
    }

    pub fn credentials(&self, provider: Provider) -> ProviderCredentials {
        self.credentials
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderCredentials {
                key_var: key_var(provider),
                ..Default::default()
            })
    }

    pub fn with_api_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        let mut creds = self.credentials(provider);
        creds.api_key = Some(key.into());
        self.credentials.insert(provider, creds);
        self
    }
}
