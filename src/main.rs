use std::path::PathBuf;

use acoustic_prep::config::PrepConfig;
use acoustic_prep::data::loader::load_embeddings;
use acoustic_prep::data::writer::{write_manifest_csv, write_padded_npz};
use acoustic_prep::eval::distance::Metric;
use acoustic_prep::eval::samediff::{evaluate, SameDiffOptions};
use acoustic_prep::pipeline::prepare;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::info;

#[derive(Debug, Parser)]
#[command(name = "acoustic-prep", version, about = "Acoustic feature archive preparation and evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, filter, truncate and pad an archive into fixed-shape tensors
    Prep(PrepArgs),
    /// Same-different evaluation of an archive of embeddings
    Samediff(SameDiffArgs),
}

#[derive(Debug, Args)]
struct PrepArgs {
    /// Feature archive (.npz, .json or .parquet)
    archive: PathBuf,
    /// Output .npz with `x`, `lengths` and optionally `mask`
    #[arg(short, long)]
    output: PathBuf,
    /// JSON config; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    min_length: Option<usize>,
    #[arg(long)]
    min_tokens_per_type: Option<usize>,
    #[arg(long)]
    max_length: Option<usize>,
    #[arg(long)]
    d_frame: Option<usize>,
    #[arg(long)]
    n_padded: Option<usize>,
    /// Left-align samples instead of centering them
    #[arg(long)]
    no_center: bool,
    /// Also write the validity mask
    #[arg(long)]
    mask: bool,
    /// Write an `index,key,label,speaker,length` CSV
    #[arg(long)]
    manifest: Option<PathBuf>,
}

impl PrepArgs {
    fn resolve_config(&self) -> Result<PrepConfig> {
        let mut config = match &self.config {
            Some(path) => PrepConfig::from_json_file(path)?,
            None => PrepConfig::default(),
        };
        if self.min_length.is_some() {
            config.min_length = self.min_length;
        }
        if self.min_tokens_per_type.is_some() {
            config.min_tokens_per_type = self.min_tokens_per_type;
        }
        if let Some(max_length) = self.max_length {
            config.max_length = max_length;
        }
        if let Some(d_frame) = self.d_frame {
            config.d_frame = d_frame;
        }
        if let Some(n_padded) = self.n_padded {
            config.n_padded = n_padded;
        }
        if self.no_center {
            config.center = false;
        }
        if self.mask {
            config.return_mask = true;
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct SameDiffArgs {
    /// Embedding archive (.npz, .json or .parquet)
    archive: PathBuf,
    #[arg(long, value_enum, default_value_t = Metric::Cosine)]
    metric: Metric,
    /// Also compute mean average precision (much slower)
    #[arg(long)]
    mean_ap: bool,
    /// Mean and variance normalise the embeddings first
    #[arg(long)]
    mvn: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Prep(args) => run_prep(&args),
        Command::Samediff(args) => run_samediff(&args),
    }
}

fn run_prep(args: &PrepArgs) -> Result<()> {
    let config = args.resolve_config()?;
    info!("Config: {config:?}");

    let prepared = prepare(&args.archive, &config)?;
    write_padded_npz(&args.output, &prepared.batch)?;
    if let Some(manifest) = &args.manifest {
        write_manifest_csv(manifest, &prepared.dataset, &prepared.batch.lengths)?;
    }
    Ok(())
}

fn run_samediff(args: &SameDiffArgs) -> Result<()> {
    let embeddings = load_embeddings(&args.archive)?;
    let report = evaluate(
        &embeddings,
        SameDiffOptions {
            metric: args.metric,
            mvn: args.mvn,
            mean_ap: args.mean_ap,
        },
    )?;
    println!("{report}");
    Ok(())
}
