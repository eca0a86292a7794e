use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use palm_etl::pipeline::{
    CompositeObserver, FileObserver, ImportObserver, Pipeline, SourceFamily, TracingObserver,
};
use palm_etl::processing::{
    IssueLevel, PlantSummary, ProductSummary, summarize_downstream, summarize_upstream,
    validate_downstream, validate_upstream,
};
use palm_etl::settings::Settings;
use palm_etl::store::DownstreamData;

#[derive(Parser)]
#[command(
    name = "palm-etl",
    version,
    about = "Import palm-oil tracking workbooks into canonical upstream/downstream datasets."
)]
struct Cli {
    /// Settings file (default: `palm-etl.toml` in the working directory, if present).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the settings file.
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daily tracking workbook → upstream and downstream.
    Seguimiento { source: Option<PathBuf> },
    /// Per-plant CPO database → upstream.
    GeoCpo { source: Option<PathBuf> },
    /// Kernel expeller workbook; patches kernel fields of existing rows.
    Cpko { source: Option<PathBuf> },
    /// Planning workbook; patches budget fields of existing rows.
    Budget { source: Option<PathBuf> },
    /// Consolidated monthly history CSV.
    Historical { source: Option<PathBuf> },
    /// Kernel mass-balance JSON reports.
    Balance {
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },
    /// Show the stored mass balance of one day (default: the latest).
    BalanceDay {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Check the stored datasets; exits non-zero when errors are found.
    Validate,
    /// Per-plant and per-product totals.
    Summary {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = Settings::discover(cli.config.as_deref()).context("loading settings")?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let observer = build_observer(&settings);
    let pipeline = Pipeline::from_settings(settings)
        .context("loading layouts")?
        .with_observer(observer);

    let import = |family: SourceFamily, source: Option<PathBuf>| -> Result<ExitCode> {
        let report = pipeline
            .import(family, source.as_deref())
            .with_context(|| format!("{family} import failed"))?;
        print!("{report}");
        Ok(ExitCode::SUCCESS)
    };

    match cli.command {
        Command::Seguimiento { source } => import(SourceFamily::Seguimiento, source),
        Command::GeoCpo { source } => import(SourceFamily::GeoCpo, source),
        Command::Cpko { source } => import(SourceFamily::Cpko, source),
        Command::Budget { source } => import(SourceFamily::Budget, source),
        Command::Historical { source } => import(SourceFamily::Historical, source),
        Command::Balance { reports } => {
            let report = pipeline
                .import_balance(&reports)
                .context("balance import failed")?;
            print!("{report}");
            Ok(ExitCode::SUCCESS)
        }
        Command::BalanceDay { date } => balance_day(&pipeline, date),
        Command::Validate => validate(&pipeline),
        Command::Summary { from, to } => summary(&pipeline, from, to),
    }
}

fn build_observer(settings: &Settings) -> Arc<dyn ImportObserver> {
    let mut observers: Vec<Arc<dyn ImportObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(file) = settings.log.file.as_ref() {
        let path = if file.is_absolute() {
            file.clone()
        } else {
            settings.data_dir.join(file)
        };
        observers.push(Arc::new(FileObserver::new(path)));
    }
    Arc::new(CompositeObserver::new(observers))
}

fn balance_day(pipeline: &Pipeline, date: Option<NaiveDate>) -> Result<ExitCode> {
    let rows = pipeline.kernel_balance_day(date)?;
    if rows.is_empty() {
        println!("no mass-balance rows");
        return Ok(ExitCode::SUCCESS);
    }
    for r in rows {
        println!(
            "{} {:<5} nut_closing_kg={} kernel_closing_kg={} cpko_closing_kg={} kernel_tea_pct={}",
            r.date,
            r.plant,
            fmt_opt(r.nut.closing),
            fmt_opt(r.kernel.closing),
            fmt_opt(r.kernel_oil.closing),
            fmt_opt(r.metrics.kernel_tea_pct),
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(pipeline: &Pipeline) -> Result<ExitCode> {
    let rules = pipeline
        .settings()
        .validation_rules(pipeline.layouts());
    let upstream = pipeline.read_upstream().context("reading upstream dataset")?;
    let mut report = validate_upstream(&upstream, &rules);

    match pipeline.read_downstream().context("reading downstream dataset")? {
        Some(DownstreamData::Current(rows)) => {
            report.issues.extend(validate_downstream(&rows, &rules).issues);
        }
        Some(DownstreamData::Legacy(rows)) => {
            println!("downstream: legacy refinery layout ({} rows), not validated", rows.len());
        }
        None => {}
    }

    for issue in &report.issues {
        println!("{issue}");
    }
    println!(
        "{} errors, {} warnings",
        report.count(IssueLevel::Error),
        report.count(IssueLevel::Warning)
    );
    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn summary(pipeline: &Pipeline, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<ExitCode> {
    let range = match (from, to) {
        (None, None) => None,
        (from, to) => Some((from.unwrap_or(NaiveDate::MIN), to.unwrap_or(NaiveDate::MAX))),
    };

    let upstream = pipeline.read_upstream().context("reading upstream dataset")?;
    for s in summarize_upstream(&upstream, range) {
        print_plant(&s);
    }
    match pipeline.read_downstream().context("reading downstream dataset")? {
        Some(DownstreamData::Current(rows)) => {
            for s in summarize_downstream(&rows, range) {
                print_product(&s);
            }
        }
        Some(DownstreamData::Legacy(rows)) => {
            println!("downstream: legacy refinery layout ({} rows)", rows.len());
        }
        None => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn print_plant(s: &PlantSummary) {
    let compliance = s.cpo_variance.and_then(|v| v.compliance);
    println!(
        "{:<8} days={:<4} rff={}/{} cpo={}/{} tea_mean={} tea_weighted={} cpo_compliance={}",
        s.plant,
        s.days,
        fmt_opt(s.rff_actual),
        fmt_opt(s.rff_budget),
        fmt_opt(s.cpo_actual),
        fmt_opt(s.cpo_budget),
        fmt_opt(s.mean_tea),
        fmt_opt(s.weighted_tea),
        fmt_opt(compliance),
    );
}

fn print_product(s: &ProductSummary) {
    println!(
        "{:<24} days={:<4} actual={} budget={} compliance={}",
        s.product,
        s.days,
        fmt_opt(s.actual),
        fmt_opt(s.budget),
        fmt_opt(s.compliance),
    );
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
