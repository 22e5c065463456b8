use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;
use testbench_workflow::WorkflowConfig;

pub mod bench_cmd;
pub mod interactive;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "testbench.toml";

#[derive(Debug, Parser)]
#[command(name = "testbench", version, about = "Run equipment test setups and record the results")]
pub struct Cli {
    #[clap(flatten)]
    pub config: ConfigArgs,

    /// Log engine activity at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the known test setups.
    Setups,
    /// Start an interactive test session on this terminal.
    Session,
    /// Generate the CSV report from every stored session.
    Export(bench_cmd::ExportArgs),
    /// Summarize the stored sessions.
    Records,
}

#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    /// Path to a TOML config file (defaults to ./testbench.toml when present).
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Directory holding the session store and generated reports.
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Setup catalog (YAML or TOML) to use instead of the built-in one.
    #[arg(long = "catalog", value_name = "FILE", global = true)]
    pub catalog: Option<PathBuf>,
}

impl ConfigArgs {
    /// Loads the config file, then applies command line overrides.
    pub fn resolve(&self) -> Result<WorkflowConfig> {
        let mut config = match &self.config_file {
            Some(path) => WorkflowConfig::load(path)?,
            None => WorkflowConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))?,
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(catalog) = &self.catalog {
            let catalog = std::path::absolute(catalog)
                .with_context(|| format!("resolve catalog path {}", catalog.display()))?;
            config.catalog = Some(catalog);
        }
        Ok(config)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.config.resolve().context("resolve configuration")?;
    tracing::debug!(?config, "resolved configuration");
    match cli.command {
        Command::Setups => bench_cmd::setups(&config),
        Command::Session => bench_cmd::session(&config),
        Command::Export(args) => bench_cmd::export(&config, args),
        Command::Records => bench_cmd::records(&config),
    }
}

pub fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TESTBENCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides_win_over_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("bench.toml");
        std::fs::write(&config_path, "data_dir = \"/from/file\"\nstore_file = \"s.json\"\n")
            .expect("write");
        let args = ConfigArgs {
            config_file: Some(config_path),
            data_dir: Some(dir.path().to_path_buf()),
            catalog: None,
        };
        let config = args.resolve().expect("resolve");
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.store_file, PathBuf::from("s.json"));
    }

    #[test]
    fn catalog_flag_is_relative_to_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("bench.toml");
        std::fs::write(&config_path, "catalog = \"from_file.yaml\"\n").expect("write");
        let args = ConfigArgs {
            config_file: Some(config_path),
            data_dir: None,
            catalog: Some(PathBuf::from("flag.yaml")),
        };
        let config = args.resolve().expect("resolve");
        let cwd = std::env::current_dir().expect("cwd");
        assert_eq!(config.catalog_path(), Some(cwd.join("flag.yaml")));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ConfigArgs {
            config_file: Some(dir.path().join("nope.toml")),
            ..ConfigArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn parses_export_flags() {
        let cli = Cli::try_parse_from([
            "testbench",
            "--data-dir",
            "/tmp/bench",
            "export",
            "--output",
            "out.csv",
            "--header-policy",
            "first-record",
        ])
        .expect("parse");
        let Command::Export(args) = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
        assert_eq!(
            args.header_policy,
            Some(testbench_workflow::HeaderPolicy::FirstRecord)
        );
        assert_eq!(cli.config.data_dir, Some(PathBuf::from("/tmp/bench")));
    }
}
