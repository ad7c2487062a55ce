//! Sequential providers × prompt files runs.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::client::Transport;
use crate::conversation::ConversationHistory;
use crate::cost::{CostTotal, format_cost};
use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::registry::{Provider, ProviderRegistry};
use crate::report::{CallResult, OutputDir, Summary};
use crate::usage::UsageMetrics;

/// Wait after every call, before any provider-specific extra.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub calls: usize,
    pub total_cost: Decimal,
}

pub struct BatchRunner<T> {
    registry: ProviderRegistry,
    transport: T,
    temperature: f64,
    delay: Duration,
    log: LogConfig,
}

impl<T: Transport> BatchRunner<T> {
    pub fn new(registry: ProviderRegistry, transport: T, temperature: f64) -> Self {
        BatchRunner {
            registry,
            transport,
            temperature,
            delay: DEFAULT_DELAY,
            log: LogConfig::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run every prompt file against every selected provider, in order.
    ///
    /// The output directory is recreated from scratch. Result files are
    /// written as calls complete; the summary only once all calls succeed.
    /// The first failure aborts the run and leaves earlier results on disk.
    pub async fn run<S: AsRef<str>>(
        &self,
        providers: &[S],
        prompt_dir: &Path,
        system_file: Option<&str>,
        output_dir: &Path,
    ) -> Result<BatchSummary> {
        info!("processing prompts in llms");

        let providers = self.registry.select(providers)?;
        let system = system_file
            .map(|name| read_text(&prompt_dir.join(name)))
            .transpose()?;
        let prompt_files = list_prompt_files(prompt_dir, system_file)?;
        let output = OutputDir::reset(output_dir)?;

        let total_calls = providers.len() * prompt_files.len();
        let mut summary = Summary::new();
        let mut total_cost = CostTotal::new();
        let mut calls = 0;
        let mut history = ConversationHistory::new();

        for provider in providers {
            history.reset(system.as_deref());

            for file in &prompt_files {
                let prompt = read_text(&prompt_dir.join(file))?;
                let result = self
                    .process(provider, &mut history, file, &prompt)
                    .await
                    .map_err(|e| e.in_call(provider.name(), file))?;

                output
                    .write_result(&result)
                    .map_err(|e| e.in_call(provider.name(), file))?;
                summary.push(&result);
                total_cost
                    .add(result.usage.cost.as_ref(), provider.name())
                    .map_err(|e| e.in_call(provider.name(), file))?;

                calls += 1;
                info!(
                    provider = provider.name(),
                    file = %file,
                    elapsed_ms = result.elapsed_ms,
                    "[{}/{}] done",
                    calls,
                    total_calls
                );

                self.pause(provider).await;
            }
        }

        output.write_summary(&summary)?;
        info!(
            "finish! - total cost (usd): {}",
            format_cost(Some(total_cost.value()))
        );

        Ok(BatchSummary {
            calls,
            total_cost: total_cost.value(),
        })
    }

    /// Send one prompt as the next user turn and record the reply.
    pub async fn process(
        &self,
        provider: &Provider,
        history: &mut ConversationHistory,
        prompt_file: &str,
        prompt: &str,
    ) -> Result<CallResult> {
        let config = provider.config();
        history.push_user(prompt);
        debug!(provider = provider.name(), model = %config.model, "processing llm");

        let started = Instant::now();
        let body = provider.build_request(history, history.system(), self.temperature)?;
        if self.log.debug {
            debug!(request = %body, "request body");
        }

        let response = self
            .transport
            .post(&config.url, &config.headers, &body)
            .await?;
        if self.log.debug {
            debug!(status = response.status, response = %response.body, "response body");
        }

        let extraction = provider
            .extractor()
            .extract(response.status, &response.body)?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let usage = UsageMetrics::new(extraction.usage, provider.cost_table())?;
        history.push_assistant(extraction.text.as_str());

        let result = CallResult {
            provider: provider.name().to_string(),
            prompt_file: prompt_file.to_string(),
            result_text: extraction.text,
            elapsed_ms,
            usage,
        };
        if self.log.debug {
            log_call(&result, history);
        }
        Ok(result)
    }

    async fn pause(&self, provider: &Provider) {
        let delay = self.delay + provider.extra_delay().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn log_call(result: &CallResult, history: &ConversationHistory) {
    for line in result.metric_lines().lines() {
        debug!("  metric: {}", line);
    }
    for message in history.iter() {
        debug!("  {:?}: {}", message.role, message.content);
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::file(path, e))
}

/// Regular files in `dir`, sorted by name, without the system instruction.
pub fn list_prompt_files(dir: &Path, system_file: Option<&str>) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::file(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::file(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| Error::file(&entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                warn!(file = ?name, "skipping prompt file with a non UTF-8 name");
                continue;
            }
        };
        if Some(name.as_str()) != system_file {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}
