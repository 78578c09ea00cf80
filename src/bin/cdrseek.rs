use anyhow::{Context, Result, anyhow};
use cdrseek::{
    about,
    alignment::{AlignmentMode, ScoringScheme, align_records},
    blast::{self, BlastProgram},
    config::Config,
    error::SearchError,
    matcher::{find_matches_with, normalize_query},
    protocol::InclusionPolicy,
    report::{ReportFormat, write_alignment_report, write_blast_report, write_search_report},
    sequence_record::SequenceRecord,
    subsections::MalformedPolicy,
    tool_overrides::{ExternalTool, active_resolution_label},
};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info};
use serde::de::DeserializeOwned;
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(
    name = "cdrseek",
    about = "Search antibody sequences and their CDR/FR subsections for a query",
    disable_version_flag = true
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short = 'V', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct OutputArgs {
    /// text, json or tsv
    #[arg(long, value_parser = parse_snake::<ReportFormat>)]
    format: Option<ReportFormat>,
}

#[derive(Subcommand)]
enum Command {
    /// Exact, non-overlapping substring search (prompts for the query if omitted)
    Search {
        #[arg(long)]
        fasta: Option<String>,
        #[arg(long)]
        query: Option<String>,
        /// Report records whose only hit is inside a subsection
        #[arg(long)]
        include_subsection_only: bool,
        /// Skip malformed Name=Sequence entries instead of failing
        #[arg(long)]
        skip_malformed: bool,
        /// Do not upper-case the query
        #[arg(long)]
        keep_case: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Pairwise alignment of the query against every record
    Align {
        #[arg(long)]
        fasta: Option<String>,
        #[arg(long)]
        query: String,
        /// local, semiglobal or global
        #[arg(long, value_parser = parse_snake::<AlignmentMode>)]
        mode: Option<AlignmentMode>,
        /// protein or nucleotide
        #[arg(long, value_parser = parse_snake::<ScoringScheme>)]
        scoring: Option<ScoringScheme>,
        /// Only report the best N alignments
        #[arg(long)]
        top: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Build a BLAST+ database and search it
    Blast {
        /// FASTA file the database is built from
        #[arg(long)]
        db: String,
        /// FASTA file with the query sequence(s)
        #[arg(long, conflicts_with = "query")]
        query_fasta: Option<String>,
        /// A single query sequence
        #[arg(long)]
        query: Option<String>,
        /// Keep the BLAST XML at this path (database is written next to it)
        #[arg(long)]
        out: Option<String>,
        /// blastp or blastn
        #[arg(long, value_parser = parse_snake::<BlastProgram>)]
        program: Option<BlastProgram>,
        #[arg(long)]
        evalue: Option<f64>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Summarize an existing BLAST XML (-outfmt 5) file
    ParseBlast {
        xml: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

fn parse_snake<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unsupported value '{value}'"))
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    config.apply_tool_overrides();
    Ok(config)
}

fn prompt_query() -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Enter the sequence query: ")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn load_records(path: &str) -> Result<Vec<SequenceRecord>> {
    let records = SequenceRecord::from_fasta_file(path)?;
    info!("Loaded {} record(s) from '{path}'", records.len());
    Ok(records)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    if cli.version {
        println!("{}", about::version_cli_text());
        for tool in [ExternalTool::MakeBlastDb, ExternalTool::Blastp, ExternalTool::Blastn] {
            println!("{}: {}", tool.default_bin(), active_resolution_label(tool));
        }
        return Ok(());
    }
    let Some(command) = cli.command else {
        return Err(anyhow!("Missing command, see 'cdrseek --help'"));
    };
    let stdout = io::stdout();

    match command {
        Command::Search {
            fasta,
            query,
            include_subsection_only,
            skip_malformed,
            keep_case,
            output,
        } => {
            let fasta = fasta.unwrap_or_else(|| config.search.fasta_path.clone());
            let raw = match query {
                Some(q) => q,
                None => prompt_query()?,
            };
            let query = if config.search.uppercase_query && !keep_case {
                normalize_query(&raw)
            } else {
                raw.trim().to_string()
            };

            let mut options = config.search.options.clone();
            if include_subsection_only {
                options.inclusion = InclusionPolicy::SequenceOrSubsection;
            }
            if skip_malformed {
                options.malformed = MalformedPolicy::Skip;
            }

            let records = load_records(&fasta)?;
            let results = find_matches_with(&query, &records, &options)
                .with_context(|| format!("Search of '{fasta}' failed"))?;
            info!(
                "{} of {} record(s) matched '{query}'",
                results.len(),
                results.records_scanned()
            );
            let format = output.format.unwrap_or(config.report.format);
            write_search_report(&results, format, stdout.lock())
        }
        Command::Align {
            fasta,
            query,
            mode,
            scoring,
            top,
            output,
        } => {
            let fasta = fasta.unwrap_or_else(|| config.search.fasta_path.clone());
            let mut options = config.alignment.clone();
            if let Some(mode) = mode {
                options.mode = mode;
            }
            if let Some(scoring) = scoring {
                options.scoring = scoring;
            }
            let records = load_records(&fasta)?;
            let mut summaries = align_records(&query, &records, &options)
                .with_context(|| format!("Alignment against '{fasta}' failed"))?;
            if let Some(top) = top {
                summaries.truncate(top);
            }
            let format = output.format.unwrap_or(config.report.format);
            write_alignment_report(&summaries, format, stdout.lock())
        }
        Command::Blast {
            db,
            query_fasta,
            query,
            out,
            program,
            evalue,
            timeout_secs,
            output,
        } => {
            let mut settings = config.blast.clone();
            if let Some(program) = program {
                settings.program = program;
            }
            if let Some(evalue) = evalue {
                settings.evalue = evalue;
            }
            if timeout_secs.is_some() {
                settings.timeout_secs = timeout_secs;
            }

            let queries = match (query_fasta, query) {
                (Some(path), _) => load_records(&path)?,
                (None, Some(seq)) => vec![SequenceRecord::new("query", seq.trim(), "query")],
                (None, None) => return Err(anyhow!("blast requires --query or --query-fasta")),
            };
            let database = load_records(&db)?;

            let outcome = match out {
                Some(out) => {
                    blast::search_records_keeping_output(&queries, &database, &out, &settings)
                }
                None => blast::search_records(&queries, &database, &settings),
            };
            let results = match outcome.map_err(SearchError::from) {
                Ok(results) => results,
                Err(SearchError::ExternalTool(e)) => {
                    error!("BLAST search against '{db}' failed: {e}");
                    return Err(anyhow!("BLAST search against '{db}' failed"));
                }
                Err(e) => return Err(e.into()),
            };
            let format = output.format.unwrap_or(config.report.format);
            write_blast_report(&results, format, stdout.lock())
        }
        Command::ParseBlast { xml, output } => {
            let results = blast::parse_blast_xml_file(&xml)?;
            let format = output.format.unwrap_or(config.report.format);
            write_blast_report(&results, format, stdout.lock())
        }
    }
}
