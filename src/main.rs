use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, Level};
use simple_logger::init_with_level;

use isoclass::annotation::io::DEFAULT_MAX_MALFORMED_FRACTION;
use isoclass::cage::DEFAULT_CAGE_WINDOW;
use isoclass::classify::DEFAULT_MONO_EXON_TOLERANCE;
use isoclass::eval::{evaluate, MetricsTable};
use isoclass::output;
use isoclass::{
    classify_all, AnnotationBuilder, CagePeakLocator, ClassifyOptions, IdNameKeys, ReferenceIndex,
};

/// Classify long-read transcript models into structural categories.
#[derive(Parser, Debug)]
#[command(name = "isoclass")]
#[command(author, version, about)]
struct Cli {
    /// Number of worker threads
    #[arg(long, short = 't', global = true, default_value_t = num_cpus::get())]
    threads: usize,

    /// Enable debug logging (tie-break diagnostics)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a reference index from a GTF/GFF annotation and write it to disk
    Index(IndexArgs),

    /// Load an index from disk and print summary stats
    Stats(StatsArgs),

    /// Classify query transcripts against a reference
    Classify(ClassifyArgs),

    /// Compare an observed classification table with an expected one
    Eval(EvalArgs),
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Attribute keys to use for gene ID (repeatable, first present wins)
    #[arg(
        long = "gene-id-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["gene_id".to_string()]
    )]
    gene_id_keys: Vec<String>,

    /// Attribute keys to use for transcript ID (repeatable)
    #[arg(
        long = "transcript-id-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["transcript_id".to_string()]
    )]
    transcript_id_keys: Vec<String>,

    /// GFF3 exon->transcript linkage keys (repeatable)
    #[arg(
        long = "parent-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["Parent".to_string()]
    )]
    parent_keys: Vec<String>,

    /// Feature types that count as exon blocks (repeatable)
    #[arg(
        long = "exon-feature-type",
        value_name = "TYPE",
        num_args = 1..,
        default_values_t = vec!["exon".to_string()]
    )]
    exon_feature_types: Vec<String>,

    /// Reject an input when more than this fraction of its rows is malformed
    #[arg(long, value_name = "FRACTION", default_value_t = DEFAULT_MAX_MALFORMED_FRACTION)]
    max_malformed: f64,
}

impl KeyArgs {
    fn builder(&self) -> AnnotationBuilder {
        AnnotationBuilder {
            keys: IdNameKeys {
                gene_id_keys: self.gene_id_keys.clone(),
                transcript_id_keys: self.transcript_id_keys.clone(),
                parent_keys: self.parent_keys.clone(),
                exon_feature_types: self.exon_feature_types.clone(),
                ..IdNameKeys::default()
            },
            max_malformed_fraction: self.max_malformed,
        }
    }
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Input annotation file (.gtf/.gff/.gff3, optionally .gz)
    #[arg(long, short)]
    annotation: PathBuf,

    /// Output serialized index file
    #[arg(long, short)]
    index: PathBuf,

    #[command(flatten)]
    keys: KeyArgs,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Serialized index file
    #[arg(long, short)]
    index: PathBuf,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Reference annotation (.gtf/.gff/.gff3, optionally .gz)
    #[arg(long, short, required_unless_present = "index", conflicts_with = "index")]
    annotation: Option<PathBuf>,

    /// Prebuilt reference index
    #[arg(long, short)]
    index: Option<PathBuf>,

    /// Query transcripts (.gtf/.gff/.gff3, optionally .gz)
    #[arg(long, short)]
    query: PathBuf,

    /// CAGE peak track (BED6+, apex in column 7)
    #[arg(long = "cage-peak", value_name = "BED")]
    cage_peak: Option<PathBuf>,

    /// Search radius around each TSS for CAGE peaks (bp)
    #[arg(long = "cage-window", default_value_t = DEFAULT_CAGE_WINDOW)]
    cage_window: u32,

    /// End slack for matching mono-exonic transcripts (bp)
    #[arg(long = "mono-exon-tolerance", default_value_t = DEFAULT_MONO_EXON_TOLERANCE)]
    mono_exon_tolerance: u32,

    /// Output file prefix
    #[arg(long, short, default_value = "isoclass")]
    output: String,

    /// Output directory
    #[arg(long, short = 'd', default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    keys: KeyArgs,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// Expected classification table
    #[arg(long, short)]
    expected: PathBuf,

    /// Observed classification table
    #[arg(long, short)]
    observed: PathBuf,
}

fn main() -> Result<()> {
    let start = std::time::Instant::now();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::Debug } else { Level::Info };
    init_with_level(level).context("initialising logger")?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .context("building thread pool")?;

    match cli.cmd {
        Command::Index(args) => {
            let idx = args
                .keys
                .builder()
                .build_from_path(&args.annotation)
                .with_context(|| format!("building index from {}", args.annotation.display()))?;

            println!("{idx}");

            idx.save(&args.index)
                .with_context(|| format!("writing index to {}", args.index.display()))?;
        }

        Command::Stats(args) => {
            let idx = ReferenceIndex::load(&args.index)
                .with_context(|| format!("reading index {}", args.index.display()))?;
            println!("{idx}");
        }

        Command::Classify(args) => run_classify(args)?,

        Command::Eval(args) => {
            let expected = output::read_classification_path(&args.expected)
                .with_context(|| format!("reading {}", args.expected.display()))?;
            let observed = output::read_classification_path(&args.observed)
                .with_context(|| format!("reading {}", args.observed.display()))?;
            let metrics = evaluate(&expected, &observed);
            print!("{}", MetricsTable(&metrics));
        }
    }

    info!("Elapsed time: {:?}", start.elapsed());
    Ok(())
}

fn load_reference(args: &ClassifyArgs, builder: &AnnotationBuilder) -> Result<ReferenceIndex> {
    match (&args.index, &args.annotation) {
        (Some(path), _) => {
            ReferenceIndex::load(path).with_context(|| format!("reading index {}", path.display()))
        }
        (None, Some(path)) => builder
            .build_from_path(path)
            .with_context(|| format!("building reference from {}", path.display())),
        (None, None) => bail!("either --annotation or --index is required"),
    }
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let builder = args.keys.builder();
    let reference = load_reference(&args, &builder)?;

    let queries = builder
        .load_queries_from_path(&args.query)
        .with_context(|| format!("reading queries from {}", args.query.display()))?;

    let cage = args
        .cage_peak
        .as_deref()
        .map(|p| {
            CagePeakLocator::from_path(p, builder.max_malformed_fraction)
                .with_context(|| format!("reading CAGE peaks from {}", p.display()))
        })
        .transpose()?;

    let opts = ClassifyOptions {
        mono_exon_tolerance: args.mono_exon_tolerance,
        cage_window: args.cage_window,
    };
    info!(
        "Classifying {} queries (mono-exon tolerance {} bp, CAGE window {} bp)",
        queries.transcripts.len(),
        opts.mono_exon_tolerance,
        opts.cage_window
    );

    let mut outcome = classify_all(&queries.transcripts, &reference, cage.as_ref(), &opts);
    let mut rejected = queries.rejected;
    rejected.append(&mut outcome.rejected);

    std::fs::create_dir_all(&args.dir)
        .with_context(|| format!("creating output directory {}", args.dir.display()))?;
    let table = out_path(&args.dir, &args.output, "classification.tsv");
    output::write_classification_path(&table, &outcome.records, cage.is_some())
        .with_context(|| format!("writing {}", table.display()))?;
    let report = out_path(&args.dir, &args.output, "rejected.tsv");
    output::write_rejected_path(&report, &rejected)
        .with_context(|| format!("writing {}", report.display()))?;

    output::log_summary(&outcome.category_counts());
    info!(
        "Wrote {} records to {} ({} rejected, see {})",
        outcome.records.len(),
        table.display(),
        rejected.len(),
        report.display()
    );
    Ok(())
}

fn out_path(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{prefix}_{suffix}"))
}
