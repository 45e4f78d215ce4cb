/*
 * aurb - A small Arch User Repository client.
 * Copyright (C) 2025  aurb contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{anyhow, Result};
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

mod aur;
mod config;
mod error;
mod logging;
mod pacman;
mod version;

use aur::{AurClient, Downloader, RemoteIndex};
use config::Config;
use error::AurbError;
use pacman::RepoIndex;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  aurb contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser)]
#[command(name = "aurb")]
#[command(version = VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(about = "A small AUR utility: search, download and upgrade checks.")]
struct Cli {
    /// Download the packages given as targets
    #[arg(short = 'S', long)]
    sync: bool,
    /// Search the AUR for the given terms (-Ss)
    #[arg(short = 's', long)]
    search: bool,
    /// Show AUR information for the given packages
    #[arg(short = 'Q', long)]
    query: bool,
    /// List installed AUR packages with a newer AUR version (-Qu)
    #[arg(short = 'u', long)]
    upgrades: bool,
    /// Directory to save downloads to (default: current directory)
    #[arg(long, value_name = "PATH")]
    save_to: Option<PathBuf>,
    /// Maximum number of concurrent AUR lookups
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
    /// Print debug diagnostics
    #[arg(short = 'v', long)]
    verbose: bool,
    /// Disable colored output
    #[arg(long)]
    no_color: bool,
    #[arg(value_name = "TARGETS")]
    targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Download,
    Search,
    Info,
    Upgrades,
}

impl Cli {
    fn action(&self) -> Option<Action> {
        if self.search {
            Some(Action::Search)
        } else if self.upgrades {
            Some(Action::Upgrades)
        } else if self.query {
            Some(Action::Info)
        } else if self.sync {
            Some(Action::Download)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {:#}", style("error:").red().bold(), e);
                if let Some(err) = e.downcast_ref::<AurbError>() {
                    if err.is_retryable() {
                        eprintln!("       check your network connection and try again.");
                    }
                }
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            // Dropping `run` aborts every request still in flight.
            eprintln!("{}: Received SIGINT, exiting.", style("ERROR").white().on_red());
            130
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let (mut cfg, config_problems) = Config::load();
    if let Some(jobs) = cli.jobs {
        cfg.concurrency = jobs;
    }
    if cli.verbose {
        cfg.logging.level = "debug".to_string();
    }
    if cli.no_color {
        cfg.color = false;
    }

    logging::init(&cfg.logging.level, cfg.logging.file.as_deref());
    for problem in &config_problems {
        warn!("{}", problem);
    }
    console::set_colors_enabled(cfg.color);
    console::set_colors_enabled_stderr(cfg.color);

    cfg.validate().map_err(|e| AurbError::configuration(e))?;

    let Some(action) = cli.action() else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    // --save-to is checked whenever it is given, like any other bad option.
    let save_dir = resolve_save_dir(cli.save_to.as_deref())?;

    let client = Arc::new(AurClient::from_config(&cfg)?);
    let repos = RepoIndex::from_config(&cfg.pacman);

    match action {
        Action::Search => search(client, &repos, &cli.targets, &cfg).await,
        Action::Info => show_info(client.as_ref(), &repos, &cli.targets).await,
        Action::Upgrades => show_upgrades(client, &repos, &cfg).await,
        Action::Download => download(client.as_ref(), &repos, &cfg, save_dir, &cli.targets).await,
    }
}

/// Resolve the download directory. Relative paths are taken from the
/// current directory; the directory must already exist.
fn resolve_save_dir(path: Option<&Path>) -> Result<PathBuf, AurbError> {
    let cwd = || {
        std::env::current_dir()
            .map_err(|e| AurbError::filesystem(".", "cannot read current directory", e))
    };

    let dir = match path {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd()?.join(p),
        None => {
            debug!("no download directory given, using the current directory");
            cwd()?
        }
    };

    if !dir.is_dir() {
        return Err(AurbError::configuration(format!(
            "{} doesn't exist. Please choose an existing directory.",
            dir.display()
        )));
    }

    dir.canonicalize()
        .map_err(|e| AurbError::filesystem(&dir, "cannot resolve directory", e))
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

async fn search(
    client: Arc<AurClient>,
    repos: &RepoIndex,
    terms: &[String],
    cfg: &Config,
) -> Result<()> {
    if terms.is_empty() {
        return Err(anyhow!("no search terms specified"));
    }

    let pb = spinner(&format!("searching the AUR for {}...", terms.join(", ")));
    let result = aur::search_and_filter(client, terms, cfg.concurrency, |name| {
        repos.in_official(name)
    })
    .await;
    pb.finish_and_clear();
    let result = result?;

    info!(
        found = result.count(),
        skipped = result.skipped,
        official = result.official,
        "search finished"
    );

    for pkg in result.sorted_by_name() {
        let ood_marker = if pkg.out_of_date.is_some() {
            style(" [out-of-date]").red().to_string()
        } else {
            String::new()
        };
        let installed_marker = if repos.is_installed(&pkg.name) {
            style(" [installed]").cyan().bold().to_string()
        } else {
            String::new()
        };

        println!(
            "{}/{} {}{}{}",
            style("aur").magenta().bold(),
            style(&pkg.name).white().bold(),
            style(&pkg.version).green(),
            ood_marker,
            installed_marker
        );
        if !pkg.description().is_empty() {
            println!("    {}", pkg.description());
        }
    }

    let count = result.count();
    println!(
        "\nFound {} {}.",
        style(count).magenta(),
        if count == 1 { "result" } else { "results" }
    );
    Ok(())
}

async fn show_info(client: &AurClient, repos: &RepoIndex, targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        return Err(anyhow!("no package specified for info"));
    }

    for target in targets {
        match client.info(target).await {
            Ok(pkg) => {
                println!("{}", style(format!("Package: {}", pkg.name)).bold().cyan());
                println!("  Version      : {}", pkg.version);
                println!("  Description  : {}", pkg.description());
                println!("  Package Base : {}", pkg.base());
                println!("  URL          : {}", pkg.url.as_deref().unwrap_or("-"));
                println!("  Maintainer   : {}", pkg.maintainer.as_deref().unwrap_or("orphan"));
                println!("  Votes        : {}", pkg.num_votes);
                println!("  Out Of Date  : {}", if pkg.out_of_date.is_some() { "Yes" } else { "No" });
                println!("  Installed    : {}", if repos.is_installed(&pkg.name) { "Yes" } else { "No" });
                println!();
            }
            Err(e) => eprintln!("{} {}: {}", style("error:").red().bold(), target, e),
        }
    }
    Ok(())
}

async fn show_upgrades(client: Arc<AurClient>, repos: &RepoIndex, cfg: &Config) -> Result<()> {
    let installed = tokio::task::spawn_blocking(pacman::foreign_packages).await??;
    if installed.is_empty() {
        println!("{}", style(":: no foreign packages installed.").green());
        return Ok(());
    }

    let pb = spinner(&format!("checking {} packages...", installed.len()));
    let report = aur::check_upgrades(client, &installed, cfg.concurrency, |name| {
        repos.in_official(name)
    })
    .await;
    pb.finish_and_clear();

    info!(
        upgrades = report.upgrades.len(),
        skipped = report.skipped,
        official = report.official,
        "upgrade check finished"
    );

    if report.upgrades.is_empty() {
        println!("{}", style(":: all AUR packages are up to date.").green());
        return Ok(());
    }

    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(vec!["package", "installed", "available"]);
    for upgrade in &report.upgrades {
        t.add_row(vec![
            upgrade.name.as_str(),
            upgrade.local_version.as_str(),
            upgrade.remote_version.as_str(),
        ]);
    }
    println!("{}", t);
    println!(
        "{} {} upgrade(s) available: {}",
        style("::").cyan().bold(),
        report.upgrades.len(),
        report.names().join(" ")
    );
    Ok(())
}

async fn download(
    client: &AurClient,
    repos: &RepoIndex,
    cfg: &Config,
    save_dir: PathBuf,
    targets: &[String],
) -> Result<()> {
    if targets.is_empty() {
        return Err(anyhow!("no package specified for download"));
    }

    let downloader = Downloader::new(client.http().clone(), cfg.aur.snapshot_url.clone(), save_dir);

    for target in targets {
        downloader.ensure_absent(target)?;

        if repos.in_official(target) {
            println!(
                "{} Found {} in an official repository. Pacman will do.",
                style("==>").yellow(),
                style(target).bold()
            );
            let command = cfg.pacman.install_command.clone();
            let name = target.clone();
            let status =
                tokio::task::spawn_blocking(move || pacman::install_from_repos(&command, &name))
                    .await??;
            if !status.success() {
                return Err(anyhow!("package manager failed for {} ({})", target, status));
            }
            continue;
        }

        let pkg = client.info(target).await?;
        println!("{} Downloading {}.", style("==>").yellow(), style(&pkg.name).bold());
        let dir = downloader.fetch(&pkg).await?;
        println!(
            "{} {} unpacked to {}",
            style("==>").green(),
            pkg.name,
            dir.display()
        );
    }
    Ok(())
}
