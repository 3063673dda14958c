use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use spectre_data::{DatasetConfig, ReadErrorPolicy, SpectreDataset, WavelengthRange};

/// Read a SPECTRE dataset and report what it yields.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Dataset root containing `Dark`, `White` and the measurement folders
    root: PathBuf,

    /// JSON file with a full dataset configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Integration time of the frames (1400, 1200, 1000 or 800)
    #[arg(long)]
    int_time: Option<u32>,

    /// First wavelength in nm (inclusive)
    #[arg(long)]
    lamb_start: Option<u32>,

    /// Last wavelength in nm (exclusive)
    #[arg(long)]
    lamb_end: Option<u32>,

    /// Minimum mean normalized signal of a sample
    #[arg(long)]
    clean_threshold: Option<f64>,

    /// Cache directory (default: .spectre_cache)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seed for the shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the scan order
    #[arg(long)]
    no_shuffle: bool,

    /// Neither read nor write the cleaning cache
    #[arg(long)]
    no_cache: bool,

    /// Do not synthesize pair samples
    #[arg(long)]
    no_augment: bool,

    /// Re-clean when the cache was built with other parameters
    #[arg(long)]
    validate_cache: bool,

    /// Skip samples that cannot be read during cleaning
    #[arg(long)]
    skip_unreadable: bool,
}

impl Args {
    fn into_config(self) -> Result<DatasetConfig> {
        let mut config = match &self.config {
            Some(path) => DatasetConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => DatasetConfig::default(),
        };
        config.root_dir = self.root;
        if let Some(t) = self.int_time {
            config.int_time = t;
        }
        config.lamb_range = WavelengthRange::new(
            self.lamb_start.unwrap_or(config.lamb_range.start),
            self.lamb_end.unwrap_or(config.lamb_range.end),
        );
        if let Some(t) = self.clean_threshold {
            config.clean_threshold = t;
        }
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.shuffle &= !self.no_shuffle;
        config.cache &= !self.no_cache;
        config.augment &= !self.no_augment;
        config.validate_cache |= self.validate_cache;
        if self.skip_unreadable {
            config.on_read_error = ReadErrorPolicy::Skip;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = Args::parse().into_config()?;
    let root = config.root_dir.clone();
    let mut dataset = SpectreDataset::open(config)
        .with_context(|| format!("opening dataset at {}", root.display()))?;

    let (rows, cols) = dataset.normalizer().dark().frame.dim();
    println!(
        "references: {rows}x{cols} frames, {} nm spectra at integration time {}",
        dataset.normalizer().white().spectrum.len(),
        dataset.config().int_time
    );

    let total = dataset.len().context("cleaning dataset")?;
    let augmented = dataset
        .candidates()
        .iter()
        .filter(|d| d.is_augmented())
        .count();
    println!(
        "{} candidate samples ({augmented} augmented), {total} after cleaning",
        dataset.candidates().len()
    );
    if dataset.is_empty()? {
        println!("dataset is empty");
        return Ok(());
    }

    let mut count = 0usize;
    let mut shapes = None;
    for sample in dataset {
        let sample = sample.with_context(|| format!("reading sample {count}"))?;
        shapes.get_or_insert((sample.frame.dim(), sample.spectrum.len()));
        count += 1;
    }

    if let Some(((rows, cols), bands)) = shapes {
        println!("read {count} samples: frame {rows}x{cols}, spectrum {bands} nm");
    }
    Ok(())
}
