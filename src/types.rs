#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Default `EnvFilter` directive for this level. Noisy HTTP internals are
    /// held back unless debugging.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug,hyper=info,reqwest=info",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
