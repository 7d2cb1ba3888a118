//! Demixer command line
//!
//! Usage:
//!   demix separate song.wav --model demixer.onnx   - Write song_Bass.wav ... song_Vocals.wav
//!   demix inspect DSD100                           - List a corpus split
//!   demix batches --config pipeline.json           - Draw training batches and report stats

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dmx_core::Instrument;
use dmx_data::{BatchSampler, Corpus, PipelineConfig, Split};
use dmx_ml::{OnnxModel, OverlapWeighting, SeparationConfig, Separator};

#[derive(Parser)]
#[command(name = "demix", about = "Demixer stem separation and training data tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate a stereo WAV into bass, drums, other and vocals
    Separate {
        /// Mixture to separate
        input: PathBuf,
        /// ONNX export of the separation network
        #[arg(short, long)]
        model: PathBuf,
        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Separation config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Hann-weighted overlap-add instead of uniform
        #[arg(long)]
        hann: bool,
    },
    /// Discover a corpus split and print its songs
    Inspect {
        /// Corpus root containing Mixtures/ and Sources/
        root: PathBuf,
        #[arg(short, long, value_enum, default_value = "train")]
        split: SplitArg,
        /// Pipeline config (JSON); its corpus root is replaced by ROOT
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Draw training batches and report shapes and sampler statistics
    Batches {
        /// Pipeline config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Corpus root (overrides the config)
        #[arg(short, long)]
        root: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value = "train")]
        split: SplitArg,
        /// Number of batches to draw (defaults to one epoch)
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Write the first augmented buffer here for listening
        #[arg(long)]
        scratch: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SplitArg {
    Train,
    Validation,
}

impl From<SplitArg> for Split {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::Train => Split::Train,
            SplitArg::Validation => Split::Validation,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Separate {
            input,
            model,
            output,
            config,
            hann,
        } => separate(&input, &model, output, config, hann),
        Commands::Inspect {
            root,
            split,
            config,
        } => inspect(root, split.into(), config),
        Commands::Batches {
            config,
            root,
            split,
            count,
            seed,
            scratch,
        } => batches(config, root, split.into(), count, seed, scratch),
    }
}

fn load_pipeline_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn separate(
    input: &Path,
    model_path: &Path,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    hann: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => SeparationConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SeparationConfig::default(),
    };
    if hann {
        config = config.with_weighting(OverlapWeighting::Hann);
    }

    let input_shape = [
        config.batch_size,
        config.codec.num_bins(),
        config.window_frames(),
        2,
    ];
    let model = OnnxModel::load(model_path, input_shape)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;

    let output_dir = match output {
        Some(dir) => dir,
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    log::info!("Separating {} into {}", input.display(), output_dir.display());
    let mut separator = Separator::new(model, config).context("Invalid separation config")?;
    let written = separator
        .separate_file(input, &output_dir)
        .with_context(|| format!("Failed to separate {}", input.display()))?;

    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn inspect(root: PathBuf, split: Split, config: Option<PathBuf>) -> Result<()> {
    let mut config = load_pipeline_config(config)?;
    config.corpus.root = root;

    let corpus = Corpus::discover(&config.corpus, split)
        .with_context(|| format!("Failed to discover {:?} split", split))?;

    for song in corpus.songs() {
        println!("{}", song.name);
    }
    let seconds = corpus.total_samples() as f64 / dmx_core::DEFAULT_SAMPLE_RATE as f64;
    println!(
        "\n{} songs, {} samples (~{:.1} min at 44.1 kHz), {} chunks of {}",
        corpus.len(),
        corpus.total_samples(),
        seconds / 60.0,
        corpus.len().div_ceil(config.corpus.chunk_size),
        config.corpus.chunk_size
    );
    println!(
        "Stems: {}",
        Instrument::ALL
            .iter()
            .map(|i| i.file_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn batches(
    config: Option<PathBuf>,
    root: Option<PathBuf>,
    split: Split,
    count: Option<usize>,
    seed: Option<u64>,
    scratch: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_pipeline_config(config)?;
    if let Some(root) = root {
        config.corpus.root = root;
    }
    if let Some(seed) = seed {
        config.sampler.seed = Some(seed);
    }

    let mut sampler =
        BatchSampler::from_config(&config, split).context("Failed to build batch sampler")?;
    log::info!("Drawing batches from {}", config.corpus.root.display());
    let count = count.unwrap_or_else(|| sampler.batches_per_epoch());
    if count == 0 {
        bail!("Nothing to draw: batch count is 0");
    }

    for n in 0..count {
        let batch = sampler
            .next_batch()
            .with_context(|| format!("Failed to draw batch {}", n + 1))?;
        if n == 0 {
            println!(
                "inputs {:?}, targets {:?}",
                batch.inputs.dim(),
                batch.targets.dim()
            );
            if let (Some(dir), Some(buffer)) = (scratch.as_deref(), sampler.augmented()) {
                buffer
                    .write_scratch(dir)
                    .with_context(|| format!("Failed to write scratch files to {}", dir.display()))?;
                println!("Augmented buffer written to {}", dir.display());
            }
        }
    }

    let stats = sampler.stats();
    println!(
        "{} batches, {} chunk loads, {} resident items, {} augmented items, {} cursor wraps",
        stats.batches_served,
        stats.chunk_loads,
        stats.raw_items,
        stats.augmented_items,
        stats.cursor_wraps
    );
    Ok(())
}
