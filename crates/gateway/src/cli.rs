use clap::{Parser, Subcommand};

use vg_domain::config::{Config, ConfigSeverity};

/// VoiceGate: real-time conversational backend for a voice assistant.
#[derive(Debug, Parser)]
#[command(name = "voicegate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the voice channel server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ───────────────────────────────────────────

/// Load the configuration from the path in `VG_CONFIG` (or `config.toml`
/// by default). A missing file resolves to the built-in defaults. Returns
/// the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("VG_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// `config validate`: print every issue; false when any is an error.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error)
}

/// `config show`: dump the resolved configuration.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
