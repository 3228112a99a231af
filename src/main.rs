//! ohco - index TEI-like XML into ordered hierarchies of content objects

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser as ClapParser, ValueEnum};

use ohco::{Batch, JsonLinesSink, Parser, ParserConfig, Pass, RecordSink, TextSink};

#[derive(ClapParser)]
#[command(name = "ohco")]
#[command(version, about = "Parse TEI-like XML into OHCO records", long_about = None)]
#[command(after_help = "EXAMPLES:
    ohco hamlet.xml                     Print records to stdout
    ohco -f json hamlet.xml             Print records as JSON lines
    ohco -o db -p word-frequencies *.xml
                                        Load a directory of documents")]
struct Cli {
    /// Input documents; ids are assigned in this order starting at 1
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// Write records and pass output into this directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Number of parallel workers (batch mode)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// JSON parser configuration (defaults to TEI)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Record format on stdout
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Post-processing pass to run per document (repeatable, batch mode)
    #[arg(short, long = "pass", value_name = "NAME")]
    passes: Vec<Pass>,

    /// Replace a non-empty output directory
    #[arg(long)]
    overwrite: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => match ParserConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ParserConfig::default(),
    };

    match &cli.output {
        Some(dir) => load(&cli, &config, dir),
        None => print_records(&cli, &config),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, _) => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn load(cli: &Cli, config: &ParserConfig, dir: &Path) -> ExitCode {
    let mut batch = Batch::new(config, dir)
        .with_passes(cli.passes.clone())
        .with_overwrite(cli.overwrite);
    if let Some(workers) = cli.workers {
        batch = batch.with_workers(workers);
    }

    let report = match batch.run(&cli.files) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    for failure in &report.failures {
        eprintln!("error: {failure}");
    }
    if !cli.quiet {
        eprintln!(
            "Loaded {}/{} document(s) into {} ({})",
            report.documents.len(),
            cli.files.len(),
            dir.display(),
            report.max_ids()
        );
    }
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_records(cli: &Cli, config: &ParserConfig) -> ExitCode {
    if !cli.passes.is_empty() {
        log::warn!("passes are only run in batch mode (--output)");
    }
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failed = !write_records(config, &cli.files, cli.format, &mut out);

    if let Err(e) = out.flush() {
        eprintln!("error: {e}");
        failed = true;
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Write the records of every file to `out`, one document at a time.
///
/// A document that fails contributes nothing to `out`. Returns false if
/// any document failed.
fn write_records<W: Write>(
    config: &ParserConfig,
    files: &[PathBuf],
    format: Format,
    out: &mut W,
) -> bool {
    let mut ok = true;
    for (i, path) in files.iter().enumerate() {
        let doc_id = i as u32 + 1;
        let rendered = match format {
            Format::Text => {
                render_file(config, doc_id, path, TextSink::new(Vec::new())).map(TextSink::into_inner)
            }
            Format::Json => render_file(config, doc_id, path, JsonLinesSink::new(Vec::new()))
                .map(JsonLinesSink::into_inner),
        };
        let written = rendered.and_then(|bytes| Ok(out.write_all(&bytes)?));
        if let Err(e) = written {
            eprintln!("error: document {doc_id} ({}): {e}", path.display());
            ok = false;
        }
    }
    ok
}

fn render_file<S: RecordSink>(
    config: &ParserConfig,
    doc_id: u32,
    path: &Path,
    sink: S,
) -> ohco::Result<S> {
    let bytes = fs::read(path)?;
    let mut known = BTreeMap::new();
    known.insert("filename".to_string(), path.display().to_string());
    let parser = Parser::new(config, doc_id, sink).with_metadata(known);
    let (max_ids, sink) = parser.parse(&bytes)?;
    log::info!("document {doc_id}: {max_ids}");
    Ok(sink)
}
