//! BLAST+ as an out-of-process collaborator: database creation, search with
//! XML output (`-outfmt 5`), and parsing of the resulting `BlastOutput` XML.
//!
//! Every tool invocation is one synchronous call with an optional timeout.
//! Nothing is retried.

use crate::{
    sequence_record::SequenceRecord,
    tool_overrides::{ExternalTool, resolve_tool_executable},
};
use cdrseek_protocol::{BlastHit, BlastHsp, BlastQueryResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{ErrorKind, Read, Seek, SeekFrom},
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlastProgram {
    #[default]
    Blastp,
    Blastn,
}

impl BlastProgram {
    pub fn tool(self) -> ExternalTool {
        match self {
            Self::Blastp => ExternalTool::Blastp,
            Self::Blastn => ExternalTool::Blastn,
        }
    }

    pub fn db_type(self) -> DbType {
        match self {
            Self::Blastp => DbType::Protein,
            Self::Blastn => DbType::Nucleotide,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Protein,
    Nucleotide,
}

impl DbType {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Protein => "prot",
            Self::Nucleotide => "nucl",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastSettings {
    pub program: BlastProgram,
    pub evalue: f64,
    pub max_target_seqs: usize,
    /// `None` waits for the tool indefinitely.
    pub timeout_secs: Option<u64>,
    /// Explicit executables; when unset they are resolved via tool overrides.
    pub makeblastdb_bin: Option<String>,
    pub search_bin: Option<String>,
}

impl Default for BlastSettings {
    fn default() -> Self {
        Self {
            program: BlastProgram::Blastp,
            evalue: 10.0,
            max_target_seqs: 500,
            timeout_secs: Some(600),
            makeblastdb_bin: None,
            search_bin: None,
        }
    }
}

impl BlastSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn makeblastdb_executable(&self) -> String {
        self.makeblastdb_bin
            .clone()
            .unwrap_or_else(|| resolve_tool_executable(ExternalTool::MakeBlastDb))
    }

    pub fn search_executable(&self) -> String {
        self.search_bin
            .clone()
            .unwrap_or_else(|| resolve_tool_executable(self.program.tool()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub executable: String,
    pub args: Vec<String>,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound {
        executable: String,
    },
    Failed {
        executable: String,
        args: Vec<String>,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        executable: String,
        args: Vec<String>,
        timeout: Duration,
    },
    MissingOutput {
        executable: String,
        path: String,
    },
    Io {
        message: String,
    },
    Parse {
        message: String,
    },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { executable } => write!(
                f,
                "Could not find executable '{}'. Install BLAST+ or set {}, {} or {}",
                executable,
                ExternalTool::MakeBlastDb.env_var(),
                ExternalTool::Blastp.env_var(),
                ExternalTool::Blastn.env_var()
            ),
            Self::Failed {
                executable,
                args,
                status,
                stdout,
                stderr,
            } => write!(
                f,
                "command failed: {} {} (status={:?}, stdout='{}', stderr='{}')",
                executable,
                args.join(" "),
                status,
                stdout.trim(),
                stderr.trim()
            ),
            Self::TimedOut {
                executable,
                args,
                timeout,
            } => write!(
                f,
                "command timed out after {:.1}s: {} {}",
                timeout.as_secs_f64(),
                executable,
                args.join(" ")
            ),
            Self::MissingOutput { executable, path } => write!(
                f,
                "{executable} reported success but did not produce output file '{path}'"
            ),
            Self::Io { message } => write!(f, "{message}"),
            Self::Parse { message } => write!(f, "Could not parse BLAST XML: {message}"),
        }
    }
}

impl std::error::Error for ToolError {}

fn io_error(context: &str, e: impl fmt::Display) -> ToolError {
    ToolError::Io {
        message: format!("{context}: {e}"),
    }
}

fn read_captured(mut file: File) -> Result<String, ToolError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| io_error("Could not rewind captured output", e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| io_error("Could not read captured output", e))?;
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

/// Runs `executable` once. Output goes to temporary files so a chatty tool
/// cannot block on a full pipe while we poll for the deadline.
pub fn run_tool(
    executable: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<ToolOutput, ToolError> {
    let stdout_file =
        tempfile::tempfile().map_err(|e| io_error("Could not create stdout capture", e))?;
    let stderr_file =
        tempfile::tempfile().map_err(|e| io_error("Could not create stderr capture", e))?;
    let stdout_handle = stdout_file
        .try_clone()
        .map_err(|e| io_error("Could not share stdout capture", e))?;
    let stderr_handle = stderr_file
        .try_clone()
        .map_err(|e| io_error("Could not share stderr capture", e))?;

    debug!("Running {} {}", executable, args.join(" "));
    let started = Instant::now();
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_handle))
        .stderr(Stdio::from(stderr_handle))
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ToolError::NotFound {
                    executable: executable.to_string(),
                }
            } else {
                io_error(
                    &format!(
                        "Could not run executable '{}' with args [{}]",
                        executable,
                        args.join(" ")
                    ),
                    e,
                )
            }
        })?;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(io_error(&format!("Could not wait for '{executable}'"), e)),
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                if let Err(e) = child.kill() {
                    warn!("Could not kill {executable} after timeout: {e}");
                }
                if let Err(e) = child.wait() {
                    warn!("Could not reap {executable} after timeout: {e}");
                }
                warn!("{executable} killed after {:.1}s", limit.as_secs_f64());
                return Err(ToolError::TimedOut {
                    executable: executable.to_string(),
                    args: args.to_vec(),
                    timeout: limit,
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = read_captured(stdout_file)?;
    let stderr = read_captured(stderr_file)?;
    if !status.success() {
        warn!(
            "{executable} exited with status {:?}: {}",
            status.code(),
            stderr.trim()
        );
        return Err(ToolError::Failed {
            executable: executable.to_string(),
            args: args.to_vec(),
            status: status.code(),
            stdout,
            stderr,
        });
    }

    Ok(ToolOutput {
        executable: executable.to_string(),
        args: args.to_vec(),
        status: status.code(),
        stdout,
        stderr,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

fn ensure_parent_dir(path: &str) -> Result<(), ToolError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                io_error(
                    &format!("Could not create BLAST output directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
    }
    Ok(())
}

pub fn make_database(
    fasta_path: &str,
    db_prefix: &str,
    settings: &BlastSettings,
) -> Result<ToolOutput, ToolError> {
    let executable = settings.makeblastdb_executable();
    let args = vec![
        "-in".to_string(),
        fasta_path.to_string(),
        "-dbtype".to_string(),
        settings.program.db_type().flag().to_string(),
        "-out".to_string(),
        db_prefix.to_string(),
    ];
    info!("Building BLAST database '{db_prefix}' from '{fasta_path}'");
    run_tool(&executable, &args, settings.timeout())
}

pub fn run_search(
    db_prefix: &str,
    query_fasta: &str,
    output_xml: &str,
    settings: &BlastSettings,
) -> Result<ToolOutput, ToolError> {
    ensure_parent_dir(output_xml)?;

    let executable = settings.search_executable();
    let args = vec![
        "-db".to_string(),
        db_prefix.to_string(),
        "-query".to_string(),
        query_fasta.to_string(),
        "-out".to_string(),
        output_xml.to_string(),
        "-outfmt".to_string(),
        "5".to_string(),
        "-evalue".to_string(),
        settings.evalue.to_string(),
        "-max_target_seqs".to_string(),
        settings.max_target_seqs.to_string(),
    ];
    info!("Searching '{query_fasta}' against '{db_prefix}'");
    let output = run_tool(&executable, &args, settings.timeout())?;

    if !Path::new(output_xml).exists() {
        return Err(ToolError::MissingOutput {
            executable,
            path: output_xml.to_string(),
        });
    }
    Ok(output)
}

fn stage_and_search(
    queries: &[SequenceRecord],
    database: &[SequenceRecord],
    db_fasta: &str,
    db_prefix: &str,
    query_fasta: &str,
    output_xml: &str,
    settings: &BlastSettings,
) -> Result<Vec<BlastQueryResult>, ToolError> {
    SequenceRecord::write_fasta_file(database, db_fasta)
        .map_err(|e| io_error("Could not stage database FASTA", e))?;
    SequenceRecord::write_fasta_file(queries, query_fasta)
        .map_err(|e| io_error("Could not stage query FASTA", e))?;

    make_database(db_fasta, db_prefix, settings)?;
    run_search(db_prefix, query_fasta, output_xml, settings)?;
    parse_blast_xml_file(output_xml)
}

/// Stages both record sets as FASTA in a scratch directory, builds a
/// database from `database`, and searches every query against it.
pub fn search_records(
    queries: &[SequenceRecord],
    database: &[SequenceRecord],
    settings: &BlastSettings,
) -> Result<Vec<BlastQueryResult>, ToolError> {
    let dir = tempfile::tempdir().map_err(|e| io_error("Could not create scratch directory", e))?;
    let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
    stage_and_search(
        queries,
        database,
        &path("db.fasta"),
        &path("db"),
        &path("query.fasta"),
        &path("out.xml"),
        settings,
    )
}

/// Like [`search_records`], but everything is kept next to `output_xml`:
/// `{output_xml}.db.fasta`, the `{output_xml}.db` database and
/// `{output_xml}.query.fasta`.
pub fn search_records_keeping_output(
    queries: &[SequenceRecord],
    database: &[SequenceRecord],
    output_xml: &str,
    settings: &BlastSettings,
) -> Result<Vec<BlastQueryResult>, ToolError> {
    ensure_parent_dir(output_xml)?;
    stage_and_search(
        queries,
        database,
        &format!("{output_xml}.db.fasta"),
        &format!("{output_xml}.db"),
        &format!("{output_xml}.query.fasta"),
        output_xml,
        settings,
    )
}

pub fn parse_blast_xml_file(path: &str) -> Result<Vec<BlastQueryResult>, ToolError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| io_error(&format!("Could not read BLAST XML file '{path}'"), e))?;
    parse_blast_xml(&text)
}

pub fn parse_blast_xml(xml: &str) -> Result<Vec<BlastQueryResult>, ToolError> {
    if !xml.contains("<BlastOutput") {
        return Err(ToolError::Parse {
            message: "expected 'BlastOutput' root element".to_string(),
        });
    }
    let parsed: BlastOutputXml = quick_xml::de::from_str(xml).map_err(|e| ToolError::Parse {
        message: e.to_string(),
    })?;

    let iterations = parsed
        .iterations
        .map(|i| i.iterations)
        .unwrap_or_default();
    if iterations.is_empty() {
        // Pre-iteration BLAST XML: one implicit query, no hits section.
        return Ok(vec![BlastQueryResult {
            query_id: parsed.query_id.unwrap_or_default(),
            query_def: parsed.query_def.unwrap_or_default(),
            query_len: parsed.query_len.unwrap_or_default(),
            hits: vec![],
            message: None,
        }]);
    }
    iterations
        .into_iter()
        .map(|iteration| {
            let hits = iteration
                .hits
                .map(|h| h.hits)
                .unwrap_or_default()
                .into_iter()
                .map(hit_from_xml)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BlastQueryResult {
                query_id: iteration.query_id.unwrap_or_default(),
                query_def: iteration.query_def.unwrap_or_default(),
                query_len: iteration.query_len.unwrap_or_default(),
                hits,
                message: iteration.message.filter(|m| !m.trim().is_empty()),
            })
        })
        .collect()
}

fn hit_from_xml(hit: HitXml) -> Result<BlastHit, ToolError> {
    let id = hit.id.unwrap_or_default();
    let hsps = hit
        .hsps
        .map(|h| h.hsps)
        .unwrap_or_default()
        .into_iter()
        .map(|hsp| hsp_from_xml(&id, hsp))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BlastHit {
        definition: hit.definition.unwrap_or_default(),
        accession: hit.accession.unwrap_or_default(),
        length: hit.length.unwrap_or_default(),
        hsps,
        id,
    })
}

fn hsp_from_xml(hit_id: &str, hsp: HspXml) -> Result<BlastHsp, ToolError> {
    let evalue = hsp.evalue.ok_or_else(|| ToolError::Parse {
        message: format!("HSP of hit '{hit_id}' has no Hsp_evalue"),
    })?;
    Ok(BlastHsp {
        bit_score: hsp.bit_score.unwrap_or_default(),
        score: hsp.score.unwrap_or_default(),
        evalue,
        query_from: hsp.query_from.unwrap_or_default(),
        query_to: hsp.query_to.unwrap_or_default(),
        hit_from: hsp.hit_from.unwrap_or_default(),
        hit_to: hsp.hit_to.unwrap_or_default(),
        identity: hsp.identity.unwrap_or_default(),
        positive: hsp.positive.unwrap_or_default(),
        gaps: hsp.gaps.unwrap_or_default(),
        align_len: hsp.align_len.unwrap_or_default(),
        qseq: hsp.qseq.unwrap_or_default(),
        hseq: hsp.hseq.unwrap_or_default(),
        midline: hsp.midline.unwrap_or_default(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename = "BlastOutput")]
struct BlastOutputXml {
    #[serde(rename = "BlastOutput_query-ID")]
    query_id: Option<String>,
    #[serde(rename = "BlastOutput_query-def")]
    query_def: Option<String>,
    #[serde(rename = "BlastOutput_query-len")]
    query_len: Option<usize>,
    #[serde(rename = "BlastOutput_iterations")]
    iterations: Option<IterationsXml>,
}

#[derive(Debug, Deserialize)]
struct IterationsXml {
    #[serde(rename = "Iteration", default)]
    iterations: Vec<IterationXml>,
}

#[derive(Debug, Deserialize)]
struct IterationXml {
    #[serde(rename = "Iteration_query-ID")]
    query_id: Option<String>,
    #[serde(rename = "Iteration_query-def")]
    query_def: Option<String>,
    #[serde(rename = "Iteration_query-len")]
    query_len: Option<usize>,
    #[serde(rename = "Iteration_hits")]
    hits: Option<HitsXml>,
    #[serde(rename = "Iteration_message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HitsXml {
    #[serde(rename = "Hit", default)]
    hits: Vec<HitXml>,
}

#[derive(Debug, Deserialize)]
struct HitXml {
    #[serde(rename = "Hit_id")]
    id: Option<String>,
    #[serde(rename = "Hit_def")]
    definition: Option<String>,
    #[serde(rename = "Hit_accession")]
    accession: Option<String>,
    #[serde(rename = "Hit_len")]
    length: Option<usize>,
    #[serde(rename = "Hit_hsps")]
    hsps: Option<HspsXml>,
}

#[derive(Debug, Deserialize)]
struct HspsXml {
    #[serde(rename = "Hsp", default)]
    hsps: Vec<HspXml>,
}

#[derive(Debug, Deserialize)]
struct HspXml {
    #[serde(rename = "Hsp_bit-score")]
    bit_score: Option<f64>,
    #[serde(rename = "Hsp_score")]
    score: Option<f64>,
    #[serde(rename = "Hsp_evalue")]
    evalue: Option<f64>,
    #[serde(rename = "Hsp_query-from")]
    query_from: Option<usize>,
    #[serde(rename = "Hsp_query-to")]
    query_to: Option<usize>,
    #[serde(rename = "Hsp_hit-from")]
    hit_from: Option<usize>,
    #[serde(rename = "Hsp_hit-to")]
    hit_to: Option<usize>,
    #[serde(rename = "Hsp_identity")]
    identity: Option<usize>,
    #[serde(rename = "Hsp_positive")]
    positive: Option<usize>,
    #[serde(rename = "Hsp_gaps")]
    gaps: Option<usize>,
    #[serde(rename = "Hsp_align-len")]
    align_len: Option<usize>,
    #[serde(rename = "Hsp_qseq")]
    qseq: Option<String>,
    #[serde(rename = "Hsp_hseq")]
    hseq: Option<String>,
    #[serde(rename = "Hsp_midline")]
    midline: Option<String>,
}
