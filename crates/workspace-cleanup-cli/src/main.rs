mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use workspace_cleanup_core::email::{
    bulk_notification, manager_notification, review_reminder, EmailContext,
};
use workspace_cleanup_core::{
    export_all, load_users_from_path, render_report, Classifier, CleanupPlanner, Dataset,
    EmailKind, ExportFormat, LlmSettings, OutputFormat, PromptTemplate, Report, RiskCategory,
    Session,
};

use crate::settings::AppConfig;

const DEBUG_ENV: &str = "WORKSPACE_CLEANUP_DEBUG";

#[derive(Parser, Debug)]
#[command(
    name = "workspace-cleanup",
    author,
    version,
    about = "Google Workspace user cleanup planner"
)]
struct Cli {
    /// Config file (TOML, YAML or JSON) with [llm] and [planner] sections
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (same as WORKSPACE_CLEANUP_DEBUG=1)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score users without consulting a model
    Score {
        /// User export CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Cap scores at 100
        #[arg(long)]
        clamp_scores: bool,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score, classify and export a cleanup plan
    Plan {
        /// User export CSV; repeat to plan several exports in one session
        #[arg(long = "input", value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
        /// Prompt template with a {{users}} placeholder
        #[arg(long, value_name = "FILE")]
        template: Option<PathBuf>,
        /// Directory for exported files; nothing is written without it
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        /// Export formats
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Markdown]
        )]
        formats: Vec<ExportFormat>,
        /// Users per AI request (overrides [planner] batch_size)
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Skip AI classification
        #[arg(long)]
        no_ai: bool,
        /// Cap scores at 100
        #[arg(long)]
        clamp_scores: bool,
        /// Emit reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Draft notification emails for risky users
    Email {
        /// User export CSV
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// individual, bulk or reminder
        #[arg(long, default_value = "bulk")]
        kind: EmailKind,
        /// Lowest risk category to include
        #[arg(long, value_name = "CATEGORY", default_value = "high")]
        min_category: RiskCategory,
        /// Manager name used in the greeting
        #[arg(long)]
        manager: Option<String>,
        /// Response deadline text
        #[arg(long)]
        deadline: Option<String>,
    },
}

/// How a successful run ended.
#[derive(Debug, Default)]
struct RunStatus {
    export_failures: usize,
    ai_failed: bool,
}

impl RunStatus {
    fn exit_code(&self) -> ExitCode {
        if self.export_failures > 0 {
            ExitCode::from(1)
        } else if self.ai_failed {
            ExitCode::from(2)
        } else {
            ExitCode::SUCCESS
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    match run(cli).await {
        Ok(status) => status.exit_code(),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<RunStatus> {
    let config = settings::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Score {
            input,
            clamp_scores,
            json,
        } => score(&config, &input, clamp_scores, json),
        Commands::Plan {
            inputs,
            template,
            out_dir,
            formats,
            batch_size,
            no_ai,
            clamp_scores,
            json,
        } => {
            let options = PlanOptions {
                template: template.as_deref(),
                out_dir: out_dir.as_deref(),
                formats: &formats,
                batch_size,
                no_ai,
                clamp_scores,
                json,
            };
            plan(&config, &inputs, options).await
        }
        Commands::Email {
            input,
            kind,
            min_category,
            manager,
            deadline,
        } => email(&config, &input, kind, min_category, manager, deadline),
    }
}

fn load(input: &Path) -> Result<Dataset> {
    let dataset = load_users_from_path(input)
        .with_context(|| format!("failed to load users from {}", input.display()))?;
    if !dataset.defaults.is_empty() {
        eprintln!(
            "{} {} field(s) in {} fell back to defaults",
            "note:".yellow().bold(),
            dataset.defaults.len(),
            input.display()
        );
    }
    Ok(dataset)
}

fn offline_planner(config: &AppConfig, clamp_scores: bool) -> Result<CleanupPlanner> {
    Ok(CleanupPlanner::new(
        config.planner.calculator(clamp_scores)?,
        Classifier::disabled(),
        config.planner.batch_size,
    ))
}

fn score(config: &AppConfig, input: &Path, clamp_scores: bool, json: bool) -> Result<RunStatus> {
    let dataset = load(input)?;
    let report = offline_planner(config, clamp_scores)?.score_only(&dataset);
    if json {
        println!("{}", render_report(&report, OutputFormat::Json)?);
        return Ok(RunStatus::default());
    }

    println!(
        "{} user(s) scored from {}",
        report.len(),
        input.display()
    );
    for row in &report.rows {
        println!(
            "- {email:<32} {score:>3} {category}",
            email = row.user.email,
            score = row.risk.score,
            category = paint(row.risk.category)
        );
    }
    let summary = report.summary();
    println!(
        "Average {:.1} • max {} • high-risk {}",
        summary.risk.average_score,
        summary.risk.max_score,
        summary.risk.high_risk_total()
    );
    Ok(RunStatus::default())
}

struct PlanOptions<'a> {
    template: Option<&'a Path>,
    out_dir: Option<&'a Path>,
    formats: &'a [ExportFormat],
    batch_size: Option<usize>,
    no_ai: bool,
    clamp_scores: bool,
    json: bool,
}

async fn plan(config: &AppConfig, inputs: &[PathBuf], options: PlanOptions<'_>) -> Result<RunStatus> {
    let llm = if options.no_ai {
        LlmSettings::disabled()
    } else {
        LlmSettings::resolve(&config.llm)?
    };
    let policy = config.planner.retry_policy(llm.max_retries)?;
    let classifier = Classifier::from_settings(&llm, policy)?;
    let planner = CleanupPlanner::new(
        config.planner.calculator(options.clamp_scores)?,
        classifier,
        options.batch_size.unwrap_or(config.planner.batch_size),
    );
    let template = match options.template {
        Some(path) => PromptTemplate::from_path(path)?,
        None => PromptTemplate::default(),
    };
    debug!(batch_size = planner.batch_size(), ai = llm.ai_enabled(), "planner ready");

    let mut session = Session::new(planner, config.planner.history_limit);
    let mut status = RunStatus::default();

    for input in inputs {
        let dataset = load(input)?;
        let report = session.generate(&dataset, &template).await;

        if options.json {
            println!("{}", render_report(report, OutputFormat::Json)?);
        } else {
            print!("{}", render_report(report, OutputFormat::Human)?);
        }

        if report.all_batches_failed() {
            eprintln!(
                "{} every AI batch failed for {}; users are left unclassified",
                "warning:".yellow().bold(),
                input.display()
            );
            status.ai_failed = true;
        }

        if let Some(dir) = options.out_dir {
            status.export_failures += write_exports(report, dir, &export_stem(input), options.formats);
        }
    }

    eprintln!("{}", history_line(&session));
    Ok(status)
}

fn export_stem(input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("users");
    format!("{stem}_cleanup_plan")
}

fn write_exports(report: &Report, dir: &Path, stem: &str, formats: &[ExportFormat]) -> usize {
    let mut failures = 0;
    for outcome in export_all(report, dir, stem, formats) {
        match outcome.result {
            Ok(path) => eprintln!("{} {} → {}", "wrote".green(), outcome.format, path.display()),
            Err(err) => {
                failures += 1;
                eprintln!("{} {} export: {err}", "failed".red().bold(), outcome.format);
            }
        }
    }
    failures
}

fn history_line(session: &Session) -> String {
    let users: usize = session.history().map(Report::len).sum();
    let latest = session
        .latest()
        .map(|report| report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".into());
    format!(
        "History: {} of {} report(s) retained, {} user(s) total, latest {}",
        session.len(),
        session.retention(),
        users,
        latest
    )
}

fn email(
    config: &AppConfig,
    input: &Path,
    kind: EmailKind,
    min_category: RiskCategory,
    manager: Option<String>,
    deadline: Option<String>,
) -> Result<RunStatus> {
    let dataset = load(input)?;
    let report = offline_planner(config, false)?.score_only(&dataset);
    let rows: Vec<_> = report.rows_at_least(min_category).collect();

    let today = chrono::Local::now().date_naive();
    let mut ctx = EmailContext::new(today).with_deadline(deadline);
    if let Some(manager) = manager {
        ctx = ctx.with_manager(manager);
    }

    match kind {
        EmailKind::Individual => {
            if rows.is_empty() {
                eprintln!("No users at or above {min_category} risk.");
            }
            for (idx, row) in rows.iter().enumerate() {
                if idx > 0 {
                    println!();
                }
                print!("{}", manager_notification(row, &ctx));
            }
        }
        EmailKind::Bulk => print!("{}", bulk_notification(&rows, &ctx)),
        EmailKind::Reminder => print!("{}", review_reminder(rows.len(), &ctx)),
    }
    Ok(RunStatus::default())
}

fn paint(category: RiskCategory) -> ColoredString {
    let label = category.label();
    match category {
        RiskCategory::Low => label.green(),
        RiskCategory::Medium => label.yellow(),
        RiskCategory::High => label.red(),
        RiskCategory::Critical => label.red().bold(),
    }
}

fn init_tracing(debug: bool) {
    let debug = debug
        || std::env::var(DEBUG_ENV)
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
    let env_filter = if debug {
        EnvFilter::new("debug,tokio=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
