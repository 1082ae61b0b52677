//! MaveDB worker main executable.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use mavedb_worker::clients::clingen::HttpClinGenClient;
use mavedb_worker::clients::clinvar::{HttpClinVarArchiveClient, CLINVAR_ARCHIVE_BASE_URL};
use mavedb_worker::clients::gnomad::HttpGnomadClient;
use mavedb_worker::clients::publications::{CrossrefClient, PubmedClient, RxivClient};
use mavedb_worker::clients::vrs::HttpVrsMapperClient;
use mavedb_worker::clients::ExternalClients;
use mavedb_worker::common;
use mavedb_worker::identifiers::PublicationClients;
use mavedb_worker::jobs::queue::JobQueue;
use mavedb_worker::jobs::AppContext;
use mavedb_worker::score_sets::{get_score_set_counts_as_csv, get_score_set_scores_as_csv};
use mavedb_worker::store::Store;
use mavedb_worker::tabular::Table;
use mavedb_worker::validation::dataframe::{
    validate_and_standardize_dataframe_pair, TargetSeqInfo,
};
use mavedb_worker::validation::target::{validate_target_sequence, SequenceType};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "MaveDB worker",
    long_about = "This tool performs variant ingestion, mapping, and enrichment for MaveDB"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Worker-related commands.
    Worker(Worker),
    /// Validation-related commands.
    Validate(Validate),
    /// Export-related commands.
    Export(Export),
}

/// Parsing of "worker *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Worker {
    /// The sub command to run
    #[command(subcommand)]
    command: WorkerCommands,
}

/// Enum supporting the parsing of "worker *" sub commands.
#[derive(Debug, Subcommand)]
enum WorkerCommands {
    Run(WorkerRunArgs),
}

/// Command line arguments for `worker run`.
#[derive(Debug, Args)]
struct WorkerRunArgs {
    /// Path to the store snapshot to load and persist.
    #[arg(long)]
    path_store: std::path::PathBuf,
    /// Base URL of the VRS mapping service.
    #[arg(long, env = "MAVEDB_VRS_URL")]
    vrs_url: String,
    /// Base URL of the ClinGen allele registry.
    #[arg(long, env = "MAVEDB_CLINGEN_URL", default_value = "https://reg.clinicalgenome.org")]
    clingen_url: String,
    /// Base URL of the ClinVar variant_summary archive.
    #[arg(long, env = "MAVEDB_CLINVAR_ARCHIVE_URL", default_value = CLINVAR_ARCHIVE_BASE_URL)]
    clinvar_archive_url: String,
    /// Endpoint of the gnomAD data lake query service.
    #[arg(long, env = "MAVEDB_GNOMAD_ENDPOINT")]
    gnomad_endpoint: String,
    /// Base URL of the Crossref works API.
    #[arg(long, default_value = "https://api.crossref.org")]
    crossref_url: String,
    /// Base URL of the NCBI eutils API.
    #[arg(long, default_value = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils")]
    eutils_url: String,
    /// Base URL of the bioRxiv/medRxiv API.
    #[arg(long, default_value = "https://api.biorxiv.org")]
    rxiv_url: String,
    /// NCBI API key, if any.
    #[arg(long, env = "NCBI_API_KEY")]
    ncbi_api_key: Option<String>,
    /// Queue poll interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
    /// Drain the queue and exit instead of polling forever.
    #[arg(long)]
    drain: bool,
}

/// Parsing of "validate *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Validate {
    /// The sub command to run
    #[command(subcommand)]
    command: ValidateCommands,
}

/// Enum supporting the parsing of "validate *" sub commands.
#[derive(Debug, Subcommand)]
enum ValidateCommands {
    Scores(ValidateScoresArgs),
}

/// Command line arguments for `validate scores`.
#[derive(Debug, Args)]
struct ValidateScoresArgs {
    /// Path to the scores CSV file.
    #[arg(long)]
    path_scores: std::path::PathBuf,
    /// Path to the optional counts CSV file.
    #[arg(long)]
    path_counts: Option<std::path::PathBuf>,
    /// The target sequence to validate variants against.
    #[arg(long)]
    target_sequence: Option<String>,
    /// Declared target sequence type.
    #[arg(long, default_value = "infer")]
    target_sequence_type: String,
}

/// Parsing of "export *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Export {
    /// The sub command to run
    #[command(subcommand)]
    command: ExportCommands,
}

/// Enum supporting the parsing of "export *" sub commands.
#[derive(Debug, Subcommand)]
enum ExportCommands {
    Scores(ExportArgs),
    Counts(ExportArgs),
}

/// Command line arguments for `export scores` and `export counts`.
#[derive(Debug, Args)]
struct ExportArgs {
    /// Path to the store snapshot.
    #[arg(long)]
    path_store: std::path::PathBuf,
    /// URN of the score set to export.
    #[arg(long)]
    urn: String,
    /// Number of leading variants to skip.
    #[arg(long)]
    start: Option<usize>,
    /// Maximum number of variants to render.
    #[arg(long)]
    limit: Option<usize>,
    /// Drop HGVS columns that are entirely null across the slice.
    #[arg(long)]
    drop_na_columns: bool,
}

fn run_worker(args: &WorkerRunArgs) -> Result<(), anyhow::Error> {
    let store = if args.path_store.exists() {
        Store::load_from_path(&args.path_store)?
    } else {
        Store::new()
    };

    let publications = PublicationClients {
        pubmed: Arc::new(PubmedClient::new(&args.eutils_url, args.ncbi_api_key.clone())),
        biorxiv: Arc::new(RxivClient::new(&args.rxiv_url, "biorxiv")),
        medrxiv: Arc::new(RxivClient::new(&args.rxiv_url, "medrxiv")),
        crossref: Arc::new(CrossrefClient::new(&args.crossref_url)),
    };
    let ctx = AppContext {
        db: Arc::new(tokio::sync::Mutex::new(store)),
        queue: Arc::new(JobQueue::new()),
        clients: ExternalClients {
            vrs: Arc::new(HttpVrsMapperClient::new(&args.vrs_url)),
            clingen: Arc::new(HttpClinGenClient::new(&args.clingen_url)),
            clinvar: Arc::new(HttpClinVarArchiveClient::new(&args.clinvar_archive_url)),
            gnomad: Arc::new(HttpGnomadClient::new(&args.gnomad_endpoint)),
            publications,
        },
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        mavedb_worker::jobs::run_worker(
            &ctx,
            std::time::Duration::from_millis(args.poll_interval_ms),
            args.drain,
        )
        .await?;
        ctx.db.lock().await.save_to_path(&args.path_store)?;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn run_validate_scores(args: &ValidateScoresArgs) -> Result<(), anyhow::Error> {
    let scores = Table::from_csv_reader(std::fs::File::open(&args.path_scores)?)?;
    let counts = args
        .path_counts
        .as_ref()
        .map(|path| -> Result<Table, anyhow::Error> {
            Ok(Table::from_csv_reader(std::fs::File::open(path)?)?)
        })
        .transpose()?;

    let target = args
        .target_sequence
        .as_ref()
        .map(|sequence| -> Result<TargetSeqInfo, anyhow::Error> {
            let declared: SequenceType = args
                .target_sequence_type
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid target sequence type"))?;
            let resolved = validate_target_sequence(sequence, declared)?;
            Ok(TargetSeqInfo {
                sequence: sequence.clone(),
                sequence_type: resolved,
            })
        })
        .transpose()?;

    let validated = validate_and_standardize_dataframe_pair(
        &scores,
        counts.as_ref(),
        None,
        None,
        target.as_ref(),
    )?;
    tracing::info!(
        rows = validated.scores.n_rows(),
        index_column = %validated.index_column,
        score_columns = ?validated.dataset_columns.score_columns,
        "validation passed"
    );
    Ok(())
}

fn run_export(args: &ExportArgs, counts: bool) -> Result<(), anyhow::Error> {
    let store = Store::load_from_path(&args.path_store)?;
    let score_set = store
        .find_score_set_by_urn(&args.urn)
        .ok_or_else(|| anyhow::anyhow!("no score set with URN {}", args.urn))?;
    let csv = if counts {
        get_score_set_counts_as_csv(
            &store,
            score_set.id,
            args.start,
            args.limit,
            args.drop_na_columns,
        )?
    } else {
        get_score_set_scores_as_csv(
            &store,
            score_set.id,
            args.start,
            args.limit,
            args.drop_na_columns,
        )?
    };
    print!("{}", csv);
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Worker(worker) => match &worker.command {
                WorkerCommands::Run(args) => run_worker(args)?,
            },
            Commands::Validate(validate) => match &validate.command {
                ValidateCommands::Scores(args) => run_validate_scores(args)?,
            },
            Commands::Export(export) => match &export.command {
                ExportCommands::Scores(args) => run_export(args, false)?,
                ExportCommands::Counts(args) => run_export(args, true)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}
