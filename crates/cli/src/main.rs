use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use ords_adapter::OrdsRecordStore;
use sqlite_adapter::SqliteMutationJournal;
use std::path::PathBuf;
use std::sync::Arc;
use sweeper_core::application::SweepService;
use sweeper_core::config::{
    ApiEndpoint, Credentials, Cutoff, ScanPolicy, SweepConfig, DEFAULT_CUTOFF,
};
use sweeper_core::domain::{AnnotateReport, PurgeReport, RunPhase};
use sweeper_core::error::SweepError;
use sweeper_core::ports::{Operator, Result};
use sweeper_core::utils::new_run_id;
use terminal_adapter::TerminalOperator;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Finds event rows stamped before a cutoff date and deletes or annotates them
#[derive(Parser, Debug)]
#[command(name = "event-sweeper")]
#[command(about = "Scans an ORDS AutoREST table for rows with an event_at before the cutoff date")]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// ORDS base URL, e.g. https://host.example.com/ords
    #[arg(long = "base-url", env = "ORDS_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "ORDS_SCHEMA_PATH", default_value = "admin")]
    schema: String,

    #[arg(long, env = "ORDS_API_PATH", default_value = "colorevents")]
    table: String,

    /// Basic-auth user; the password is always read from DB_PASSWORD
    #[arg(long, env = "DB_USER", default_value = "ADMIN")]
    user: String,

    /// Rows whose event_at sorts before this date (YYYY-MM-DD) are selected
    #[arg(long, default_value = DEFAULT_CUTOFF)]
    cutoff: String,

    /// Record every issued write in this SQLite file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Keep going with the rows scanned so far when a page request is rejected
    #[arg(long = "allow-partial")]
    allow_partial: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete every row before the cutoff
    Purge {
        /// Skip the yes/no prompt
        #[arg(long)]
        yes: bool,
    },
    /// Mark every row before the cutoff in its `extra` column
    Annotate {
        /// Choose "mark" without showing the menu
        #[arg(long)]
        mark: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        std::process::exit(report_error(&e));
    }
}

/// Prints the diagnostic for `e` and returns the process exit code
fn report_error(e: &SweepError) -> i32 {
    match e {
        SweepError::MissingCredential(var) => {
            eprintln!("请设置 {} 环境变量", var);
            eprintln!("例如: export {}='your_password'", var);
        }
        _ => eprintln!("Error: {}", e),
    }
    1
}

fn resolve_base_url(target: &TargetArgs) -> Result<String> {
    match target.base_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        _ => Err(SweepError::Config(
            "ORDS base URL is not set (use --base-url or ORDS_BASE_URL)".to_string(),
        )),
    }
}

fn run(cli: Cli) -> Result<()> {
    let target = cli.target;

    // Everything that can fail locally is checked before the first request
    let credentials = Credentials::from_env(&target.user)?;
    let base_url = resolve_base_url(&target)?;
    let cutoff = Cutoff::parse(&target.cutoff)?;
    let endpoint = ApiEndpoint::new(&base_url, &target.schema, &target.table);
    let store = OrdsRecordStore::new(&endpoint, credentials)?;
    let journal = target
        .journal
        .as_deref()
        .map(SqliteMutationJournal::open)
        .transpose()?
        .map(Arc::new);

    let scan_policy = if target.allow_partial {
        ScanPolicy::AllowPartial
    } else {
        ScanPolicy::Strict
    };
    let run_id = new_run_id(Utc::now());
    info!(run_id = %run_id, resource = %store.resource_url(), cutoff = %cutoff, "Starting run");

    match cli.command {
        Command::Purge { yes } => {
            let config = SweepConfig::for_purge(cutoff).with_scan_policy(scan_policy);
            let service = build_service(
                store,
                Box::new(TerminalOperator::stdio(yes)),
                config,
                run_id.clone(),
                journal.clone(),
            );

            println!("扫描错误数据...");
            let report = service.purge()?;
            print_purge_report(&report);
        }
        Command::Annotate { mark } => {
            let config = SweepConfig::for_annotate(cutoff).with_scan_policy(scan_policy);
            let service = build_service(
                store,
                Box::new(TerminalOperator::stdio(mark)),
                config,
                run_id.clone(),
                journal.clone(),
            );

            println!("开始扫描错误的时间戳记录...");
            let report = service.annotate()?;
            print_annotate_report(&report);
        }
    }

    if let Some(journal) = journal {
        let acknowledged = journal.acknowledged_ids(&run_id)?;
        info!(
            run_id = %run_id,
            acknowledged = acknowledged.len(),
            "Mutation journal written"
        );
    }

    Ok(())
}

fn build_service(
    store: OrdsRecordStore,
    operator: Box<dyn Operator>,
    config: SweepConfig,
    run_id: String,
    journal: Option<Arc<SqliteMutationJournal>>,
) -> SweepService {
    let service = SweepService::new(Box::new(store), operator, config, run_id);
    match journal {
        Some(journal) => service.with_journal(Box::new(journal)),
        None => service,
    }
}

fn print_truncation_warning(truncated: bool) {
    if truncated {
        println!("注意: 扫描因请求失败提前结束，结果可能不完整");
    }
}

fn print_purge_report(report: &PurgeReport) {
    print_truncation_warning(report.truncated);
    match report.phase {
        RunPhase::Aborted => println!("取消操作"),
        _ => {
            println!("\n完成! 删除了 {} 条记录", report.issued);
            if report.acknowledged != report.issued {
                println!("其中 {} 条返回 HTTP 200", report.acknowledged);
            }
        }
    }
}

fn print_annotate_report(report: &AnnotateReport) {
    print_truncation_warning(report.truncated);
    match report.phase {
        RunPhase::Aborted => println!("\n仅显示统计信息，未修改数据"),
        _ => println!(
            "\n完成! 成功标记 {}/{} 条记录",
            report.succeeded, report.attempted
        ),
    }
}
