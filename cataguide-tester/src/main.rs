mod reports;
mod util;

use anyhow::{Context, Result, bail, ensure};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;

use cataguide_data::{Dataset, SpawnRoot, normalize_kind};
use reports::{CheckSummary, Outcome, SampledEntries};
use util::{build_context, load_dataset};

#[derive(Debug, Parser)]
#[command(name = "cataguide", version)]
#[command(about = "Inspect a game-content corpus: flattened lookups, spawn tables and validation")]
struct Args {
    /// Corpus document (`{ build_number, release, data }` JSON)
    #[arg(long)]
    corpus: PathBuf,

    /// Optional configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Print one flattened record
    Get {
        /// Record type; concrete item types resolve to `item`
        #[arg(long)]
        kind: String,
        #[arg(long)]
        id: String,
    },
    /// List the concrete records of one type
    List {
        #[arg(long)]
        kind: String,
        /// Keep only ids matching this regular expression
        #[arg(long)]
        filter: Option<String>,
    },
    /// Compute the spawn table of an item group, mapgen or palette
    Spawn {
        #[arg(long)]
        root: String,
        /// Active events (comma-separated, `!name` marks one inactive)
        #[arg(long, default_value = "")]
        events: String,
        /// Current season
        #[arg(long)]
        season: Option<String>,
        /// Set world flags (comma-separated, `!name` marks one unset)
        #[arg(long, default_value = "")]
        flags: String,
        /// Also roll the group this many times and report the estimate
        #[arg(long)]
        sample: Option<u32>,
        /// Seed for `--sample`
        #[arg(long, default_value_t = 1337)]
        seed: u64,
    },
    /// Flatten every record and report structural errors
    Check,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.verbose {
        announce_banner();
    }

    let (dataset, fingerprint) = load_dataset(&args.corpus, args.config.as_deref())?;
    let outcome = run_command(&args.command, &dataset, fingerprint)?;
    write_report(&args, &outcome)?;

    if args.verbose {
        let stats = dataset.flattener().stats();
        eprintln!(
            "{} {} cached, {} cache hits, {} ancestors walked",
            "📦".cyan(),
            stats.cached,
            stats.cache_hits,
            stats.ancestors_walked
        );
    }

    if outcome.failed() {
        std::process::exit(1);
    }
    Ok(())
}

fn announce_banner() {
    eprintln!("{}", "📚 Cataguide".bright_cyan().bold());
    eprintln!("{}", "============".cyan());
}

fn run_command(command: &Command, dataset: &Dataset, fingerprint: String) -> Result<Outcome> {
    match command {
        Command::Get { kind, id } => get_record(dataset, kind, id),
        Command::List { kind, filter } => list_records(dataset, kind, filter.as_deref()),
        Command::Spawn {
            root,
            events,
            season,
            flags,
            sample,
            seed,
        } => {
            let context = build_context(events, season.as_deref(), flags);
            let report = dataset
                .compute_spawn(root, &context)
                .with_context(|| format!("failed to compute spawn table for `{root}`"))?;
            let sampled = match sample {
                Some(trials) => {
                    ensure!(*trials > 0, "--sample needs at least one trial");
                    let Some(SpawnRoot::ItemGroup(group)) =
                        dataset.spawn_engine().detect_root(root)
                    else {
                        bail!("sampling supports item groups only; `{root}` is not one");
                    };
                    let mut rng = ChaCha20Rng::seed_from_u64(*seed);
                    let entries = dataset
                        .sampler()
                        .estimate(&group, &context, *trials, &mut rng)
                        .with_context(|| format!("failed to sample `{group}`"))?;
                    Some(SampledEntries {
                        trials: *trials,
                        seed: *seed,
                        entries,
                    })
                }
                None => None,
            };
            Ok(Outcome::Spawn { report, sampled })
        }
        Command::Check => Ok(check_corpus(dataset, fingerprint)),
    }
}

fn get_record(dataset: &Dataset, kind: &str, id: &str) -> Result<Outcome> {
    let kind = normalize_kind(kind);
    let record = dataset
        .flattener()
        .get(kind, id)
        .with_context(|| format!("failed to look up {kind} `{id}`"))?;
    Ok(Outcome::Get {
        kind: record.type_name.clone(),
        id: record.id().unwrap_or(id).to_string(),
        fields: record.fields.clone(),
    })
}

fn list_records(dataset: &Dataset, kind: &str, filter: Option<&str>) -> Result<Outcome> {
    let kind = normalize_kind(kind);
    let filter = filter
        .map(Regex::new)
        .transpose()
        .context("invalid --filter expression")?;
    let records = dataset
        .flattener()
        .by_type(kind)
        .with_context(|| format!("failed to enumerate {kind} records"))?;
    let ids = records
        .iter()
        .filter_map(|record| record.id())
        .filter(|id| filter.as_ref().is_none_or(|re| re.is_match(id)))
        .map(str::to_string)
        .collect();
    Ok(Outcome::List {
        kind: kind.to_string(),
        ids,
    })
}

fn check_corpus(dataset: &Dataset, fingerprint: String) -> Outcome {
    let flattener = dataset.flattener();
    Outcome::Check(CheckSummary {
        build_number: flattener.meta().build_number.clone(),
        fingerprint,
        load: flattener.load_report(),
        kinds: flattener
            .kind_counts()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect(),
        issues: flattener.validate(),
    })
}

fn write_report(args: &Args, outcome: &Outcome) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, outcome)?,
        "markdown" => reports::generate_markdown_report(&mut output_target, outcome)?,
        "csv" => reports::generate_csv_report(&mut output_target, outcome)?,
        _ => reports::generate_console_report(&mut output_target, outcome)?,
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
