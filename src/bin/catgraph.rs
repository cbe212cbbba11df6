//! Binary entry point for the catgraph builder, server and admin tools.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use catgraph::{
    cli::{run_build, run_query, BuildConfig},
    config::{ServerConfig, ServerOverrides},
    query::{Line, QueryKind, QueryRequest, DEFAULT_PAGE_SIZE},
    server::{install_tracing_subscriber, serve},
    storage::{stats, verify, StatsReport, VerifyLevel, VerifyReport},
};

#[derive(Parser, Debug)]
#[command(
    name = "catgraph",
    version,
    about = "Category-graph index builder and query server",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Build graph files from a sorted `child parent kind` edge list")]
    Build(BuildCmd),

    #[command(about = "Load the graph and serve queries over HTTP")]
    Serve(ServeCmd),

    #[command(about = "Print graph and file statistics")]
    Stats {
        #[arg(value_name = "DIR")]
        data_dir: PathBuf,
    },

    #[command(about = "Verify the on-disk graph encoding")]
    Verify {
        #[arg(value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Full,
            help = "Depth of verification"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Run one query offline and print its protocol lines")]
    Query(QueryCmd),
}

#[derive(Args, Debug)]
struct BuildCmd {
    #[arg(long, value_name = "DIR", help = "Directory receiving the graph files")]
    out: PathBuf,

    #[arg(long, value_name = "FILE", help = "Edge list; reads stdin when omitted")]
    input: Option<PathBuf>,

    #[arg(long, help = "Hide the progress spinner")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, value_name = "FILE", help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory holding the graph files")]
    data_dir: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Bind address")]
    host: Option<IpAddr>,

    #[arg(long, value_name = "PORT", help = "Bind port")]
    port: Option<u16>,

    #[arg(long, value_name = "N", help = "Maximum number of admitted jobs")]
    queue_capacity: Option<usize>,
}

#[derive(Args, Debug)]
struct QueryCmd {
    #[arg(value_name = "DIR")]
    data_dir: PathBuf,

    #[arg(long, help = "First category")]
    c1: i64,

    #[arg(long, help = "Second category or path target")]
    c2: Option<i64>,

    #[arg(long, default_value_t = -1, allow_negative_numbers = true, help = "Depth limit for c1")]
    d1: i64,

    #[arg(long, default_value_t = -1, allow_negative_numbers = true, help = "Depth limit for c2")]
    d2: i64,

    #[arg(long, default_value_t = 0, help = "Result offset")]
    offset: i64,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE as i64, help = "Page size")]
    size: i64,

    #[arg(long, value_enum, help = "Algorithm; inferred from c1/c2 when omitted")]
    kind: Option<KindArg>,

    #[arg(long, value_name = "FILE", help = "Config file providing tag categories")]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    List,
    And,
    Not,
    Fqv,
    Path,
}

impl From<KindArg> for QueryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::List => QueryKind::List,
            KindArg::And => QueryKind::And,
            KindArg::Not => QueryKind::Not,
            KindArg::Fqv => QueryKind::Fqv,
            KindArg::Path => QueryKind::Path,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Build(cmd) => {
            install_tracing_subscriber();
            let summary = run_build(&BuildConfig {
                input: cmd.input,
                out_dir: cmd.out.clone(),
                quiet: cmd.quiet,
            })?;
            emit(&cli.format, &summary, |_| {
                println!(
                    "Built {} into {}: lines={} groups={} subcat_links={} file_links={} skipped={} repairs={}",
                    summary.max_node,
                    cmd.out.display(),
                    summary.lines,
                    summary.groups,
                    summary.subcat_links,
                    summary.file_links,
                    summary.skipped,
                    summary.repairs
                );
            })?;
        }
        Command::Serve(cmd) => {
            install_tracing_subscriber();
            let mut config = ServerConfig::load(cmd.config.as_deref())?;
            config.apply(ServerOverrides {
                data_dir: cmd.data_dir,
                host: cmd.host,
                port: cmd.port,
                queue_capacity: cmd.queue_capacity,
            });
            if let Err(err) = serve(config).await {
                eprintln!("server terminated: {err}");
                return Err(Box::new(err));
            }
        }
        Command::Stats { data_dir } => {
            let report = stats(&data_dir)?;
            emit(&cli.format, &report, |_| print_stats_text(&report))?;
        }
        Command::Verify { data_dir, level } => {
            let report = verify(&data_dir, level.into())?;
            emit(&cli.format, &report, |_| print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Query(cmd) => {
            let config = match &cmd.config {
                Some(path) => ServerConfig::load(Some(path))?,
                None => ServerConfig::default(),
            };
            let request = QueryRequest {
                c1: cmd.c1,
                c2: cmd.c2,
                depth1: cmd.d1,
                depth2: cmd.d2,
                offset: cmd.offset,
                size: cmd.size,
                kind: cmd.kind.map(QueryKind::from),
            };
            let lines = run_query(
                &cmd.data_dir,
                &request,
                &config.tag_categories,
                config.results_per_line,
            )?;
            let rendered: Vec<String> = lines.iter().map(Line::to_string).collect();
            emit(&cli.format, &rendered, |_| {
                for line in &rendered {
                    println!("{line}");
                }
            })?;
        }
    }

    Ok(())
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_stats_text(report: &StatsReport) {
    let graph = &report.graph;
    println!(
        "Graph: max_node={} categories={} placeholders={} files={}",
        graph.max_node, graph.categories, graph.placeholders, graph.files
    );
    println!(
        "       subcat_links={} file_links={} block_words={} data_age_secs={}",
        graph.subcat_links, graph.file_links, graph.block_words, graph.data_age_secs
    );
    println!();
    let fs = &report.filesystem;
    println!(
        "Files: dir={} cat_bytes={} tree_bytes={} done_marker={}",
        fs.data_dir, fs.cat_size_bytes, fs.tree_size_bytes, fs.done_marker
    );
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify ({:?}) => success={} max_node={} categories={} files={} subcat_links={} file_links={}",
        report.level,
        report.success,
        report.counts.max_node,
        report.counts.categories,
        report.counts.files,
        report.counts.subcat_links,
        report.counts.file_links,
    );
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}
