//! Provider configuration, loaded once per run and read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::conversation::ConversationHistory;
use crate::cost::CostTable;
use crate::error::{Error, Result};
use crate::extract::ResponseExtractor;
use crate::providers::{CanonicalRequest, ProviderFamily};

/// Selects every configured provider, in key order.
pub const ALL_PROVIDERS: &str = "all";

/// One entry of the provider config file.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// When false no temperature is sent at all.
    #[serde(default = "default_supports_temperature")]
    pub supports_temperature: bool,
    #[serde(default)]
    pub cost_by_million: Option<CostTable>,
    #[serde(default)]
    pub result_path: Option<String>,
    #[serde(default)]
    pub input_tokens_path: Option<String>,
    #[serde(default)]
    pub output_tokens_path: Option<String>,
    /// Extra seconds to wait after each call to this provider.
    #[serde(default)]
    pub sleep: Option<f64>,
}

fn default_supports_temperature() -> bool {
    true
}

/// A provider with its family and response paths resolved.
#[derive(Clone, Debug)]
pub struct Provider {
    name: String,
    config: ProviderConfig,
    family: ProviderFamily,
    extractor: ResponseExtractor,
    extra_delay: Option<Duration>,
}

impl Provider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Result<Self> {
        let name = name.into();
        let family = ProviderFamily::from_model(&config.model);
        let extractor = ResponseExtractor::new(
            config.result_path.as_deref(),
            config.input_tokens_path.as_deref(),
            config.output_tokens_path.as_deref(),
        )
        .map_err(|e| Error::config(format!("provider `{}`: {}", name, e)))?;
        let extra_delay = config
            .sleep
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    Error::config(format!(
                        "provider `{}`: sleep must be a non-negative number of seconds, got {}",
                        name, secs
                    ))
                })
            })
            .transpose()?;

        debug!(provider = %name, model = %config.model, %family, "provider resolved");
        Ok(Self {
            name,
            config,
            family,
            extractor,
            extra_delay,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn family(&self) -> ProviderFamily {
        self.family
    }

    pub fn extractor(&self) -> &ResponseExtractor {
        &self.extractor
    }

    /// Provider-specific wait after each call; `None` when not configured.
    pub fn extra_delay(&self) -> Option<Duration> {
        self.extra_delay
    }

    pub fn cost_table(&self) -> Option<&CostTable> {
        self.config.cost_by_million.as_ref()
    }

    /// Wire body for the current conversation. The history is only read.
    pub fn build_request(
        &self,
        history: &ConversationHistory,
        system: Option<&str>,
        temperature: f64,
    ) -> Result<Value> {
        let request = CanonicalRequest {
            model: &self.config.model,
            messages: history.messages(),
            system,
            temperature: self.config.supports_temperature.then_some(temperature),
            max_tokens: self.config.max_tokens,
        };
        self.family.build(&request)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    /// Read the config file, substituting `{NAME}` with each variable in `env`.
    pub fn load<I>(path: impl AsRef<Path>, env: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let path = path.as_ref();
        info!(file = %path.display(), "loading provider config");
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read provider config {}: {}", path.display(), e))
        })?;
        Self::from_json(&substitute_env(&content, env))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let configs: BTreeMap<String, ProviderConfig> = serde_json::from_str(content)
            .map_err(|e| Error::config(format!("invalid provider config: {}", e)))?;

        let providers = configs
            .into_iter()
            .map(|(name, config)| -> Result<(String, Provider)> {
                Ok((name.clone(), Provider::new(name, config)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { providers })
    }

    pub fn get(&self, name: &str) -> Result<&Provider> {
        self.providers
            .get(name)
            .ok_or_else(|| Error::config(format!("invalid llm: unknown provider `{}`", name)))
    }

    /// Configured provider keys in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Resolve requested keys in the order given; `all` expands to every
    /// provider. Any unknown key fails the whole selection.
    pub fn select<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<&Provider>> {
        if requested.iter().any(|name| name.as_ref() == ALL_PROVIDERS) {
            return Ok(self.providers.values().collect());
        }
        requested.iter().map(|name| self.get(name.as_ref())).collect()
    }
}

/// Replace every exact `{NAME}` token with the variable's value.
///
/// The content is scanned once; substituted values are copied as they are
/// and never scanned again.
pub fn substitute_env<I>(content: &str, env: I) -> String
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = env.into_iter().collect();
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after
            .find('}')
            .and_then(|close| vars.get(&after[..close]).map(|value| (close, value)));
        match token {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Environment variables usable for substitution. Entries whose name or
/// value is not valid UTF-8 are skipped.
pub fn utf8_env<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter().filter_map(|(key, value)| {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!(var = ?key, "skipping non UTF-8 environment variable");
                None
            }
        }
    })
}
