//! crossbell CLI
//!
//! Command-line interface for repacking translated text into the game's
//! disc image or install directory.

mod commands;
mod error;
mod spinner;

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use crossbell_lib::GameFormat;

pub(crate) use error::CliError;

#[derive(Parser)]
#[command(name = "crossbell")]
#[command(about = "Repack translated text into the game's data files", long_about = None)]
struct Cli {
    /// Show relocations, skipped files and other engine detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Release being repacked.
#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    /// UMD disc image (Shift-JIS)
    Psp,
    /// Installed PC release (GBK)
    Pc,
}

impl From<FormatArg> for GameFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Psp => GameFormat::Psp,
            FormatArg::Pc => GameFormat::Pc,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite game files from a translation set
    Build {
        /// Target release
        #[arg(long, value_enum)]
        format: FormatArg,

        /// Disc image to read (psp)
        #[arg(long)]
        source_iso: Option<PathBuf>,

        /// Where to write the repacked image (psp)
        #[arg(long)]
        destination_iso: Option<PathBuf>,

        /// Install directory to rewrite in place (pc)
        #[arg(long)]
        game_path: Option<PathBuf>,

        /// Translation set directory
        #[arg(long)]
        translation: PathBuf,

        /// Title layout TOML (defaults to the saved setting, then the built-in layout)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip files that fail to decode instead of aborting the run
        #[arg(long)]
        keep_going: bool,
    },

    /// Print the settings file path
    ConfigPath,

    /// Manage the saved title layout
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the settings file and the layout a build would use
    Show,

    /// Save a title layout as the default
    Set {
        /// Path to the title layout TOML
        path: PathBuf,
    },

    /// Forget the saved title layout
    Clear,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Build {
            format,
            source_iso,
            destination_iso,
            game_path,
            translation,
            config,
            keep_going,
        } => commands::build::run_build_command(
            crossbell_lib::BuildArgs {
                format: format.into(),
                source_iso,
                destination_iso,
                game_path,
                translation_path: translation,
                title_config: config,
            },
            keep_going,
            cli.quiet,
        ),
        Commands::ConfigPath => {
            commands::config::run_config_path();
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::run_config_show(),
            ConfigAction::Set { path } => commands::config::run_config_set(&path),
            ConfigAction::Clear => commands::config::run_config_clear(),
        },
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Plain messages at info level, labelled ones otherwise. `RUST_LOG`
/// overrides the level picked by `-v`/`-q`.
fn init_logger(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| match record.level() {
            Level::Info => writeln!(buf, "{}", record.args()),
            Level::Error => writeln!(
                buf,
                "{} {}",
                "error:".if_supports_color(Stderr, |t| t.red()),
                record.args()
            ),
            Level::Warn => writeln!(
                buf,
                "{} {}",
                "warning:".if_supports_color(Stderr, |t| t.yellow()),
                record.args()
            ),
            _ => writeln!(
                buf,
                "{}",
                record.args().if_supports_color(Stderr, |t| t.dimmed())
            ),
        })
        .init();
}

/// Print an empty line through the logger.
pub(crate) fn log_blank() {
    log::info!("");
}
