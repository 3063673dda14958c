use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use spectre_data::config::SUPPORTED_INT_TIMES;
use spectre_data::data::loader::{frame_file_name, DARK_DIR, SPECTRUM_FILE, WHITE_DIR};

/// Write a small synthetic dataset tree that the `spectre` loader can read.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output directory (created if missing)
    out: PathBuf,

    /// Number of measurement folders
    #[arg(long, default_value = "6")]
    count: usize,

    /// Seed for the noise generator
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Frame height in pixels
    #[arg(long, default_value = "8")]
    rows: usize,

    /// Frame width in pixels
    #[arg(long, default_value = "8")]
    cols: usize,
}

/// Counts of the dark and white captures at the reference integration time.
const DARK_COUNTS: f64 = 120.0;
const WHITE_COUNTS: f64 = 3800.0;
const REFERENCE_INT_TIME: f64 = 1400.0;

/// The spectrometer samples every half nanometre over a wider window than
/// the loader's default range.
const SPECTRUM_START_NM: f64 = 400.0;
const SPECTRUM_END_NM: f64 = 750.0;
const SPECTRUM_STEP_NM: f64 = 0.5;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Gaussian read noise with the given standard deviation.
fn noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std_dev
}

/// Reflectance of a sample as a function of wavelength, within (0, 1].
type Reflectance = Box<dyn Fn(f64) -> f64>;

fn random_reflectance(rng: &mut StdRng) -> Reflectance {
    let base = rng.random_range(0.05..0.3);
    let peaks: Vec<(f64, f64, f64)> = (0..3)
        .map(|_| {
            (
                rng.random_range(450.0..690.0),
                rng.random_range(15.0..60.0),
                rng.random_range(0.1..0.6),
            )
        })
        .collect();
    Box::new(move |nm| {
        let r: f64 = base + peaks.iter().map(|&(mu, s, a)| gaussian(nm, mu, s, a)).sum::<f64>();
        r.min(1.0)
    })
}

fn write_measurement(
    dir: &Path,
    reflectance: &dyn Fn(f64) -> f64,
    rows: usize,
    cols: usize,
    rng: &mut StdRng,
) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    // Each pixel of the filter-array camera sees one band of the visible range.
    let band_of = |i: usize, j: usize| {
        let k = (i * cols + j) as f64 / (rows * cols).max(1) as f64;
        450.0 + k * 240.0
    };

    for &int_time in &SUPPORTED_INT_TIMES {
        let scale = int_time as f64 / REFERENCE_INT_TIME;
        let frame = Array2::from_shape_fn((rows, cols), |(i, j)| {
            let signal = reflectance(band_of(i, j)) * (WHITE_COUNTS - DARK_COUNTS);
            let counts = (DARK_COUNTS + signal) * scale + noise(rng, 4.0);
            counts.round().clamp(0.0, u16::MAX as f64) as u16
        });
        let path = dir.join(frame_file_name(int_time));
        let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        frame
            .write_npy(file)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let path = dir.join(SPECTRUM_FILE);
    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["wavelengths", "Intensity"])?;
    let steps = ((SPECTRUM_END_NM - SPECTRUM_START_NM) / SPECTRUM_STEP_NM) as usize;
    for step in 0..=steps {
        let nm = SPECTRUM_START_NM + step as f64 * SPECTRUM_STEP_NM;
        let intensity = reflectance(nm) + noise(rng, 0.002);
        writer.write_record([format!("{nm:.1}"), format!("{intensity:.6}")])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // Reference captures: nothing reaches the sensor, or everything does.
    write_measurement(&args.out.join(DARK_DIR), &|_| 0.0, args.rows, args.cols, &mut rng)?;
    write_measurement(&args.out.join(WHITE_DIR), &|_| 1.0, args.rows, args.cols, &mut rng)?;

    for k in 0..args.count {
        let reflectance = random_reflectance(&mut rng);
        let dir = args.out.join(format!("meas_{k:03}"));
        write_measurement(&dir, &*reflectance, args.rows, args.cols, &mut rng)?;
        log::debug!("wrote {}", dir.display());
    }

    println!(
        "Wrote {} measurements ({}x{} frames, {}-{} nm spectra) to {}",
        args.count,
        args.rows,
        args.cols,
        SPECTRUM_START_NM,
        SPECTRUM_END_NM,
        args.out.display()
    );
    Ok(())
}
