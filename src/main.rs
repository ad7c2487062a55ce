use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use llm_batch::registry::utf8_env;
use llm_batch::{BatchRunner, HttpTransport, LogConfig, ProviderRegistry};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log request/response bodies, per-call metrics and conversation history
    #[arg(long)]
    debug: bool,

    /// Temperature used for every provider
    #[arg(long, default_value_t = 1.0)]
    temperature: f64,

    /// JSON file with one entry per provider
    #[arg(long, default_value = "config/llms_config.json")]
    llm_config_file: PathBuf,

    /// Directory with the prompt files and the system command file
    #[arg(long, default_value = "prompts")]
    prompts_dir: PathBuf,

    /// System command file name inside the prompts directory
    #[arg(long, default_value = "0_system_command.txt")]
    system_command_file: String,

    /// Directory the results are written to; recreated on every run
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Comma separated provider keys, or `all`
    #[arg(long, default_value = "all")]
    llms: String,

    /// Env file providing the values for `{VAR}` placeholders
    #[arg(long, env = "LLM_BATCH_ENV_FILE", default_value = "config/.env")]
    env_file: PathBuf,

    /// Fixed wait after every call, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
}

impl Args {
    fn providers(&self) -> Vec<String> {
        self.llms
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

async fn run(args: Args, log: LogConfig) -> anyhow::Result<()> {
    let registry = ProviderRegistry::load(&args.llm_config_file, utf8_env(std::env::vars_os()))?;
    info!("configured llms: {:?}", registry.names());
    let runner = BatchRunner::new(registry, HttpTransport::new(), args.temperature)
        .with_delay(Duration::from_millis(args.delay_ms))
        .with_log_config(log);

    let providers = args.providers();
    let summary = runner
        .run(
            providers.as_slice(),
            &args.prompts_dir,
            Some(args.system_command_file.as_str()),
            &args.output_dir,
        )
        .await?;
    info!(calls = summary.calls, "batch complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log = LogConfig::new(args.debug);
    log.init()?;

    info!(file = %args.env_file.display(), "loading .env file");
    if let Err(e) = dotenv::from_path(&args.env_file) {
        info!("no env file loaded: {}", e);
    }

    info!("debug: {}", args.debug);
    info!("temperature: {}", args.temperature);
    info!("llm-config-file: {}", args.llm_config_file.display());
    info!("prompts-dir: {}", args.prompts_dir.display());
    info!("system-command-file: {}", args.system_command_file);
    info!("output-dir: {}", args.output_dir.display());
    info!("llms: {:?}", args.providers());

    if let Err(e) = run(args, log).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
