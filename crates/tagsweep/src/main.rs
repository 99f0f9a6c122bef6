#![warn(clippy::all, clippy::dbg_macro)]

use std::{io::Write as _, process::ExitCode};

use anstream::{eprintln, println};
use anyhow::{Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use ignore::WalkBuilder;
use owo_colors::OwoColorize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use config::Config;
use registry::{DockerHub, Offline, TagSource};

mod apply;
mod config;
mod extract;
mod github;
mod output;
mod plan;
mod planner;
mod registry;
mod tags;
mod vcs;

/// Scans YAML manifests for container image references and proposes
/// tag updates as a pull request.
#[derive(Parser)]
#[command(about, version)]
struct App {
    /// Compute and report the plan without touching files or opening a
    /// pull request.
    #[arg(long, env = "INPUT_DRY")]
    dry: bool,

    /// Perform no registry lookups; every reference is treated as
    /// unresolvable.
    #[arg(long, env = "TAGSWEEP_OFFLINE")]
    offline: bool,

    /// The GitHub token used to push the update branch and open the
    /// pull request.
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// The `owner/repo` slug of the repository being updated.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: Option<String>,

    /// Glob selecting the manifests to scan.
    #[arg(long, env = "INPUT_FILE-MATCH", default_value = config::DEFAULT_FILE_MATCH)]
    file_match: String,

    /// Additional fields to check, as a JSON object mapping field
    /// names to templates with one `?` placeholder, e.g.
    /// `{"portainer_version": "portainer/portainer-ce:?-alpine"}`.
    #[arg(long, env = "INPUT_EXTRA-FIELDS")]
    extra_fields: Option<String>,

    /// The output format for the computed plan.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Control the use of color in output.
    #[arg(long, value_enum, value_name = "MODE")]
    color: Option<ColorMode>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// The root of the working tree to scan.
    #[arg(default_value = ".")]
    path: Utf8PathBuf,
}

#[derive(Debug, Default, Copy, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output, grouped by file.
    #[default]
    Plain,
    /// JSON-formatted plan records.
    Json,
    /// GitHub Actions workflow commands plus a `plan` output parameter.
    Github,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum ColorMode {
    /// Use color output if the output supports it.
    Auto,
    /// Force color output, even if the output isn't a terminal.
    Always,
    /// Disable color output, even if the output is a compatible terminal.
    Never,
}

impl From<ColorMode> for anstream::ColorChoice {
    fn from(value: ColorMode) -> Self {
        match value {
            ColorMode::Auto => Self::Auto,
            ColorMode::Always => Self::Always,
            ColorMode::Never => Self::Never,
        }
    }
}

/// Collects the files under `root` selected by the configured glob,
/// in sorted path order.
fn collect_files(root: &Utf8Path, config: &Config) -> Result<Vec<Utf8PathBuf>> {
    // Walk everything except what `.gitignore` and friends exclude;
    // source archives without `.git/` still honor them.
    let mut walker = WalkBuilder::new(root);
    walker
        .standard_filters(false)
        .require_git(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = entry?;
        let path = <&Utf8Path>::try_from(entry.path())?;
        if !path.is_file() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if config.matches_path(relative) {
            files.push(path.to_path_buf());
        }
    }

    // Walk order is filesystem-dependent; plan order must not be.
    files.sort();
    Ok(files)
}

fn run() -> Result<ExitCode> {
    let app = App::parse();

    let color_mode = match app.color {
        Some(mode) => mode,
        None => {
            // If `--color` wasn't specified, check the common
            // environment variables before falling back to detection.
            if std::env::var("NO_COLOR").is_ok() {
                ColorMode::Never
            } else if std::env::var("FORCE_COLOR").is_ok()
                || std::env::var("CLICOLOR_FORCE").is_ok()
            {
                ColorMode::Always
            } else {
                ColorMode::Auto
            }
        }
    };
    anstream::ColorChoice::write_global(color_mode.into());

    let filter = EnvFilter::builder()
        .with_default_directive(app.verbose.tracing_level_filter().into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    let config = Config::new(&app)?;

    let files = collect_files(&app.path, &config)?;
    if files.is_empty() {
        tracing::info!("no files match {glob}", glob = app.file_match);
    }

    let hub;
    let offline;
    let tags: &dyn TagSource = if app.offline {
        offline = Offline;
        &offline
    } else {
        hub = DockerHub::new()?;
        &hub
    };

    let plan = planner::PlanBuilder::new(&config, tags).build(&files);

    // The plan is always reported before any apply step, so it stays
    // available for diagnosis even when the apply step fails.
    let github_output = std::env::var("GITHUB_OUTPUT").ok().map(Utf8PathBuf::from);
    {
        let mut stdout = anstream::stdout().lock();
        match app.format {
            OutputFormat::Plain => output::render_plain(&mut stdout, &plan)?,
            OutputFormat::Json => output::render_json(&mut stdout, &plan)?,
            OutputFormat::Github => {
                output::render_github(&mut stdout, github_output.as_deref(), &plan)?
            }
        }
        stdout.flush()?;
    }

    if config.dry_run() || plan.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let token = app
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            anyhow!("a token is required to open a pull request; pass --token or set INPUT_TOKEN")
        })?;
    let slug = app
        .repo
        .as_deref()
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| {
            anyhow!("a repository slug is required; pass --repo or set GITHUB_REPOSITORY")
        })?;

    apply::apply(&plan, &app.path, slug, token)?;

    println!(
        "{applied} {count} update(s)",
        applied = "applied".green().bold(),
        count = plan.len()
    );

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    // Returning an ExitCode keeps exits clean rather than performing a
    // hard process exit.
    match run() {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!("{fatal}: {err:#}", fatal = "fatal".red().bold());
            ExitCode::FAILURE
        }
    }
}
