mod entry;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use regex::Regex;
use shared::Location;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use self::entry::Entry;

const LOG_EXTENSIONS: [&str; 3] = ["log", "txt", "json"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Dashboard entries (array of `{name, value, unit, range, extra}`).
    Json,
    /// Bencher Metric Format.
    Bmf,
    /// `name x ops/sec ±rme% (n runs sampled)` lines.
    Benchmarkjs,
    /// `name 50/75/90/95%=... ms avg=... ms (n runs sampled)` lines.
    Replicache,
}

#[derive(Parser, Debug)]
#[command(name = "log_processor")]
#[command(about = "Turns benchmark runner output into dashboard entries")]
struct Args {
    /// Runner log or JSON result file. Can be provided multiple times.
    #[arg(short, long, value_name = "PATH", num_args = 1.., action = clap::ArgAction::Append)]
    input: Vec<PathBuf>,

    /// Directory scanned recursively for `.log`, `.txt` and `.json` files.
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Keep only benchmarks whose name matches.
    #[arg(long, value_name = "REGEX")]
    run: Option<Regex>,

    /// Append the browser announced in the log to each name.
    #[arg(long, default_value_t = false)]
    tag_browser: bool,

    /// Append ` [SUFFIX]` to every name.
    #[arg(long, value_name = "SUFFIX")]
    suffix: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Where to write the output (path or s3://bucket/key). Prints to stdout
    /// when omitted.
    #[arg(long, value_name = "LOCATION")]
    out: Option<String>,

    /// Log as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    shared::log::init(args.log_json);

    let files = input_files(&args.input, args.dir.as_deref()).context("input files")?;
    if files.is_empty() {
        anyhow::bail!("no input files, pass --input or --dir");
    }

    let mut entries = Vec::new();
    for file in &files {
        entries.extend(
            entry::read_file(file, args.tag_browser)
                .await
                .with_context(|| format!("process {file:?}"))?,
        );
    }

    let mut entries = entry::select(entries, args.run.as_ref());
    if let Some(suffix) = &args.suffix {
        entry::tag(&mut entries, suffix);
    }
    info!("Files: {} | Benchmarks: {}", files.len(), entries.len());

    let output = render(&entries, args.format).context("render")?;

    match &args.out {
        Some(out) => {
            let location: Location = out.parse().context("--out")?;
            let content_type = match args.format {
                OutputFormat::Json | OutputFormat::Bmf => "application/json",
                OutputFormat::Benchmarkjs | OutputFormat::Replicache => "text/plain",
            };
            location
                .write_string(&output, content_type)
                .await
                .with_context(|| format!("write {location}"))?;
            info!("Wrote {}", location);
        }
        None => print!("{output}"),
    }

    Ok(())
}

fn input_files(inputs: &[PathBuf], dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut files = inputs.to_vec();

    if let Some(dir) = dir {
        if !dir.is_dir() {
            anyhow::bail!("{dir:?} is not a directory");
        }

        let mut found: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| LOG_EXTENSIONS.contains(&ext))
            })
            .collect();
        found.sort();
        files.extend(found);
    }

    Ok(files)
}

fn render(entries: &[Entry], format: OutputFormat) -> Result<String> {
    let output = match format {
        OutputFormat::Json => {
            let benches = entries
                .iter()
                .map(Entry::to_bench)
                .collect::<Result<Vec<_>>>()?;
            serde_json::to_string_pretty(&benches)? + "\n"
        }
        OutputFormat::Bmf => serde_json::to_string_pretty(&entry::bmf(entries)?)? + "\n",
        OutputFormat::Benchmarkjs => lines(entries, Entry::benchmark_js_line)?,
        OutputFormat::Replicache => lines(entries, Entry::replicache_line)?,
    };

    Ok(output)
}

fn lines(entries: &[Entry], line: fn(&Entry) -> Result<String>) -> Result<String> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&line(entry)?);
        out.push('\n');
    }

    Ok(out)
}
