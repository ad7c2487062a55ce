use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging settings handed to the components that emit diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Emit request/response bodies, per-call metrics and history dumps.
    pub debug: bool,
}

impl LogConfig {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn max_level(&self) -> Level {
        if self.debug { Level::TRACE } else { Level::INFO }
    }

    /// Install the global subscriber. Call once, from the binary.
    pub fn init(&self) -> anyhow::Result<()> {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(self.max_level())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}
