use anyhow::Result;
use figment::{Figment, providers::{Env, Format, Toml, Serialized}};
use garde::Validate;
use clap::Parser;

use super::AppConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pcf-telemetry", version, about = "Serve request and circuit breaker metrics")]
pub struct Cli {
    /// Path to an additional configuration file
    #[arg(long, env = "APP_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Server port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Environment name, selects config/{environment}.toml
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Load configuration, lowest to highest priority:
/// embedded defaults, `config/default.toml`, `config/{environment}.toml`,
/// the `--config` file, `APP_` environment variables, CLI flags.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let env_name = cli.environment.clone().unwrap_or_else(|| "production".to_string());

    let mut figment = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Serialized::default("metrics.environment", &env_name))
        .merge(Toml::file("config/default.toml"))
        .merge(Toml::file(format!("config/{}.toml", env_name)));

    if let Some(path) = &cli.config {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("APP_").split("__"));

    if let Some(port) = cli.port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if cli.debug {
        figment = figment.merge(Serialized::default("logging.level", "debug"));
    }

    let config: AppConfig = figment.extract()?;

    config.validate()?;

    Ok(config)
}
