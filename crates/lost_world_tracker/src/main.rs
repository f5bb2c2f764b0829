mod config;
mod login;
mod prompts;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use lostworld_core::output::render_json;
use lostworld_core::{
    block_on, export_favorites, logout, AggregatedRecord, CredentialStore, ExportProgress,
    ExportResult, ExportStage, OutputFormat, ProgressCallback, SessionValidator,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::{default_data_dir, AppConfig, CONFIG_NAME};
use login::PasteCookieLogin;
use prompts::pause_with_message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Export favorited VRChat worlds, including private and removed ones", long_about = None)]
struct Cli {
    /// Run mode: 0 exports favorites (default), 1 logs out
    mode: Option<String>,

    /// Custom path to application.json
    #[arg(long = "config-path")]
    config_path: Option<PathBuf>,

    /// Directory for the encrypted cookie file
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Exit without waiting for Enter
    #[arg(long = "no-pause")]
    no_pause: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Logout,
}

impl Mode {
    fn from_arg(arg: Option<&str>) -> Option<Self> {
        match arg {
            None | Some("0") => Some(Mode::Normal),
            Some("1") => Some(Mode::Logout),
            Some(_) => None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    };
    if !cli.no_pause {
        pause_with_message("\nPress Enter to continue . . .").ok();
    }
    code
}

fn run(cli: &Cli) -> Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_NAME));
    match Mode::from_arg(cli.mode.as_deref()) {
        Some(Mode::Normal) => run_export(&config_path, &data_dir),
        Some(Mode::Logout) => run_logout(&config_path, &data_dir),
        None => {
            debug!(mode = ?cli.mode, "unrecognized mode, nothing to do");
            Ok(())
        }
    }
}

fn run_export(config_path: &Path, data_dir: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let validator = SessionValidator::new(config.client_options());

    let reporter = Arc::new(StageReporter::default());
    let callback_reporter = Arc::clone(&reporter);
    let callback: ProgressCallback = Arc::new(move |p| callback_reporter.update(p));
    let options = config.export_options(Some(callback));

    let result = block_on(async {
        let store = open_store(data_dir).await?;
        let session = validator
            .establish(&store, &PasteCookieLogin)
            .await
            .context("login authentication failed")?;
        println!(
            "{} {}",
            style("Logged in as").green(),
            style(&session.user.display_name).bold()
        );
        println!(
            "API request interval: {}ms (change `api_inter_request_delay` in {})\n",
            config.api_inter_request_delay,
            config_path.display()
        );
        let result = export_favorites(&session, options).await;
        reporter.finish();
        result.context("failed to export favorites")
    })??;

    if let Some(report) = console_report(config.output_format, &result.records)? {
        println!("{report}");
    }
    print_summary(&result);
    Ok(())
}

fn run_logout(config_path: &Path, data_dir: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let options = config.client_options();
    let outcome = block_on(async {
        let store = open_store(data_dir).await?;
        logout(&options, &store).await.context("logout failed")
    })??;
    match outcome {
        Some(message) => println!("{message}"),
        None => println!("{}", style("No stored session, nothing to log out.").yellow()),
    }
    Ok(())
}

async fn open_store(data_dir: &Path) -> Result<CredentialStore> {
    CredentialStore::in_dir(data_dir)
        .await
        .context("failed to read the cookie key from the OS secret store")
}

/// The JSON report is also echoed to the console.
fn console_report(format: OutputFormat, records: &[AggregatedRecord]) -> Result<Option<String>> {
    match format {
        OutputFormat::Json => Ok(Some(render_json(records)?)),
        OutputFormat::Csv => Ok(None),
    }
}

fn print_summary(result: &ExportResult) {
    println!(
        "{} {} of {} favorites, {} private worlds refreshed",
        style("Exported").green().bold(),
        result.records.len(),
        result.favorites_count,
        result.enrich_stats.updated
    );
    if result.enrich_stats.not_found > 0 {
        println!(
            "{} {} private worlds no longer exist",
            style("Note:").yellow(),
            result.enrich_stats.not_found
        );
    }
    println!(
        "{} `{}`",
        style("Report written to").green(),
        result.output_path.display()
    );
    println!("Complete.");
}

/// One progress bar per pipeline stage.
#[derive(Default)]
struct StageReporter {
    current: Mutex<Option<(ExportStage, ProgressBar)>>,
}

impl StageReporter {
    fn update(&self, progress: ExportProgress) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let stale = current
            .as_ref()
            .is_some_and(|(stage, _)| *stage != progress.stage);
        if stale {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
        }
        let (_, bar) = current.get_or_insert_with(|| (progress.stage, new_bar(progress.stage)));
        if let Some(total) = progress.total {
            bar.set_length(total);
        }
        bar.set_position(progress.current);
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
        }
    }
}

fn new_bar(stage: ExportStage) -> ProgressBar {
    let label = match stage {
        ExportStage::Favorites => "Favorites",
        ExportStage::FavoriteGroups => "Favorite groups",
        ExportStage::PrivateWorlds => "Private worlds",
    };
    let bar = ProgressBar::new(0);
    let template = "{msg:>16} [{bar:30.cyan/blue}] {pos:>4}/{len:4}";
    if let Ok(bar_style) = ProgressStyle::with_template(template) {
        bar.set_style(bar_style.progress_chars("=> "));
    }
    bar.set_message(label);
    bar
}
