use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use meterread::app::{run_loop_command, run_once_command};
use meterread::cli::{Cli, Commands, ConfigAction};
use meterread::config::{Config, load_dotenv};
use meterread::diagnostics::check_dependencies;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    log::debug!("meterread {}", meterread::version_string());

    match cli.command {
        Commands::RunOnce {
            output,
            save_debug,
            mqtt,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_once_command(&config, output, save_debug, mqtt)?;
        }
        Commands::RunLoop {
            interval,
            output_dir,
            save_debug,
            mqtt,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_loop_command(&config, interval, output_dir, save_debug, mqtt)?;
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            let pipeline_config = config.to_pipeline_config()?;
            let publish = config.broker_config(false).is_some();
            if !check_dependencies(&pipeline_config, publish) {
                std::process::exit(1);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", config.redacted().to_toml()?);
            }
            ConfigAction::Path => {
                println!("{}", Config::default_path().display());
            }
        },
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "meterread",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Initialize env_logger from the verbosity flags; `RUST_LOG` wins when set.
fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load config from custom path or default location, with `.env` and
/// environment overrides applied.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    load_dotenv();

    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}
