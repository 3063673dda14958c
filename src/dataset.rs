use std::iter::FusedIterator;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::DatasetConfig;
use crate::data::cache::{self, CacheProvenance, CacheRecord};
use crate::data::filter::{clean_index, combined_spectrum};
use crate::data::loader::{read_references, FsMeasurementReader, MeasurementReader};
use crate::data::model::{Measurement, SampleDescriptor};
use crate::data::normalize::Normalizer;
use crate::data::scan::scan_root;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Cursor – position in one pass over the cleaned index
// ---------------------------------------------------------------------------

/// Permutation of index positions and how far the pass has got.
#[derive(Debug, Clone)]
struct Cursor {
    order: Vec<usize>,
    position: usize,
}

impl Cursor {
    fn new(order: Vec<usize>) -> Self {
        Self { order, position: 0 }
    }

    fn current(&self) -> Option<usize> {
        self.order.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn remaining(&self) -> usize {
        self.order.len().saturating_sub(self.position)
    }
}

/// The cleaned index together with its cursor. Built once per dataset.
#[derive(Debug, Clone)]
struct ReadyIndex {
    samples: Vec<SampleDescriptor>,
    cursor: Cursor,
}

impl ReadyIndex {
    fn current(&self) -> Option<&SampleDescriptor> {
        self.cursor.current().map(|i| &self.samples[i])
    }
}

// ---------------------------------------------------------------------------
// SpectreDataset
// ---------------------------------------------------------------------------

/// A hyperspectral dataset read lazily, one `(frame, spectrum)` sample at a time.
///
/// Construction reads the `Dark`/`White` references and scans the root for
/// candidate samples. The first call to [`len`](Self::len),
/// [`next_sample`](Self::next_sample) or the iterator cleans the candidates
/// (or loads the cleaned index from the cache) and fixes the sample order.
/// After that the dataset is a single pass: once exhausted or closed it
/// produces nothing more.
pub struct SpectreDataset<R = FsMeasurementReader> {
    config: DatasetConfig,
    reader: R,
    normalizer: Normalizer,
    candidates: Vec<SampleDescriptor>,
    index: Option<ReadyIndex>,
    closed: bool,
}

impl SpectreDataset<FsMeasurementReader> {
    /// Open a dataset stored in the published folder layout.
    pub fn open(config: DatasetConfig) -> Result<Self> {
        Self::with_reader(config, FsMeasurementReader::new())
    }
}

impl<R: MeasurementReader> SpectreDataset<R> {
    /// Open a dataset whose measurements are read through `reader`.
    pub fn with_reader(config: DatasetConfig, reader: R) -> Result<Self> {
        config.validate()?;
        let normalizer =
            read_references(&reader, &config.root_dir, config.int_time, config.lamb_range)?;
        let candidates = scan_root(&config.root_dir, config.augment)?;
        log::info!(
            "Opened dataset {} with {} candidate samples",
            config.root_dir.display(),
            candidates.len()
        );
        Ok(Self {
            config,
            reader,
            normalizer,
            candidates,
            index: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Samples found by the root scan, before cleaning.
    pub fn candidates(&self) -> &[SampleDescriptor] {
        &self.candidates
    }

    /// The cleaned index in storage order (not the iteration order).
    pub fn samples(&mut self) -> Result<&[SampleDescriptor]> {
        Ok(&self.ensure_ready()?.samples)
    }

    /// Number of samples that survived cleaning. Fixed after the first call.
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.ensure_ready()?.samples.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Samples still to be produced in this pass.
    pub fn remaining(&mut self) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }
        Ok(self.ensure_ready()?.cursor.remaining())
    }

    /// Produce the next normalized sample, or `None` once the pass is over.
    ///
    /// An error closes the dataset: the failing sample is not retried and
    /// later calls return `Ok(None)`.
    pub fn next_sample(&mut self) -> Result<Option<Measurement>> {
        if self.closed {
            return Ok(None);
        }
        let descriptor = match self.ensure_ready() {
            Ok(index) => match index.current() {
                Some(d) => d.clone(),
                None => return Ok(None),
            },
            Err(e) => {
                self.closed = true;
                return Err(e);
            }
        };
        match self.materialize(&descriptor) {
            Ok(sample) => {
                if let Some(index) = self.index.as_mut() {
                    index.cursor.advance();
                }
                Ok(Some(sample))
            }
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    /// Stop producing samples. Safe to call at any time, any number of times.
    pub fn close(&mut self) {
        if !self.closed {
            log::debug!("dataset closed");
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read and normalize a sample; augmented samples multiply both folders.
    pub fn materialize(&self, descriptor: &SampleDescriptor) -> Result<Measurement> {
        let first = self.read_normalized(descriptor.primary())?;
        match descriptor.partner() {
            None => Ok(first),
            Some(partner) => first.combine(&self.read_normalized(partner)?),
        }
    }

    fn read_normalized(&self, folder: &Path) -> Result<Measurement> {
        let raw = self
            .reader
            .read_measurement(folder, self.config.int_time, self.config.lamb_range)?;
        self.normalizer.measurement(&raw)
    }

    // -- finalization --

    fn ensure_ready(&mut self) -> Result<&mut ReadyIndex> {
        let index = match self.index.take() {
            Some(index) => index,
            None => {
                let samples = self.load_or_clean()?;
                let order = self.sample_order(samples.len());
                ReadyIndex {
                    samples,
                    cursor: Cursor::new(order),
                }
            }
        };
        Ok(self.index.insert(index))
    }

    fn load_or_clean(&self) -> Result<Vec<SampleDescriptor>> {
        let cache_path = self.config.cache_path();
        let provenance = CacheProvenance::from_config(&self.config);

        if self.config.cache {
            if let Some(record) = cache::load(&cache_path)? {
                if !self.config.validate_cache || record.provenance == provenance {
                    log::info!(
                        "Found dataset cache at {}, skipping data cleaning",
                        cache_path.display()
                    );
                    return Ok(record.samples);
                }
                log::info!(
                    "Dataset cache at {} was built with other parameters, cleaning again",
                    cache_path.display()
                );
            }
        }

        log::info!(
            "Cleaning {} candidate samples, this might take a while",
            self.candidates.len()
        );
        let range = self.config.lamb_range;
        let samples = clean_index(
            &self.candidates,
            self.config.clean_threshold,
            self.config.on_read_error,
            |descriptor| {
                combined_spectrum(&self.normalizer, descriptor, |folder| {
                    self.reader.read_spectrum(folder, range)
                })
            },
        )?;
        log::info!(
            "Data cleaning kept {} of {} samples",
            samples.len(),
            self.candidates.len()
        );

        if self.config.cache {
            let record = CacheRecord {
                provenance,
                samples,
            };
            cache::store(&cache_path, &record)?;
            log::info!("Saved dataset cache to {}", cache_path.display());
            return Ok(record.samples);
        }
        Ok(samples)
    }

    fn sample_order(&self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        if self.config.shuffle {
            match self.config.seed {
                Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => order.shuffle(&mut rand::rng()),
            }
        }
        log::debug!("sample order fixed for {len} samples (shuffle: {})", self.config.shuffle);
        order
    }
}

impl<R: MeasurementReader> Iterator for SpectreDataset<R> {
    type Item = Result<Measurement>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sample().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match (&self.index, self.closed) {
            (_, true) => (0, Some(0)),
            // A read error ends the pass early, so only one more item is
            // guaranteed.
            (Some(index), false) => {
                let n = index.cursor.remaining();
                (n.min(1), Some(n))
            }
            (None, false) => (0, None),
        }
    }
}

impl<R: MeasurementReader> FusedIterator for SpectreDataset<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReadErrorPolicy, WavelengthRange};
    use crate::data::normalize::EPSILON;
    use crate::error::SpectreError;
    use ndarray::{Array1, Array2};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// In-memory reader keyed by folder name. Frames are 2x2 filled with the
    /// folder's level, spectra have three values of the same level.
    struct MemoryReader {
        levels: HashMap<String, f64>,
        missing_frames: Vec<String>,
        spectrum_reads: RefCell<Vec<String>>,
    }

    impl MemoryReader {
        fn new(levels: &[(&str, f64)]) -> Self {
            let mut map: HashMap<String, f64> =
                levels.iter().map(|(n, l)| (n.to_string(), *l)).collect();
            map.insert("Dark".into(), 0.0);
            map.insert("White".into(), 1.0);
            Self {
                levels: map,
                missing_frames: Vec::new(),
                spectrum_reads: RefCell::new(Vec::new()),
            }
        }

        fn level(&self, folder: &Path) -> Result<f64> {
            let name = folder.file_name().unwrap().to_string_lossy().to_string();
            self.levels
                .get(&name)
                .copied()
                .ok_or_else(|| SpectreError::invalid_format(folder, "unknown folder"))
        }

        fn measurement_reads(&self) -> usize {
            self.spectrum_reads
                .borrow()
                .iter()
                .filter(|n| *n != "Dark" && *n != "White")
                .count()
        }
    }

    impl MeasurementReader for MemoryReader {
        fn read_frame(&self, folder: &Path, _int_time: u32) -> Result<Array2<f64>> {
            let name = folder.file_name().unwrap().to_string_lossy();
            if self.missing_frames.iter().any(|m| *m == name) {
                return Err(SpectreError::invalid_format(folder, "no frame"));
            }
            Ok(Array2::from_elem((2, 2), self.level(folder)?))
        }

        fn read_spectrum(&self, folder: &Path, _range: WavelengthRange) -> Result<Array1<f64>> {
            let level = self.level(folder)?;
            self.spectrum_reads
                .borrow_mut()
                .push(folder.file_name().unwrap().to_string_lossy().to_string());
            Ok(Array1::from_elem(3, level))
        }
    }

    fn root_with(folders: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in ["Dark", "White"].iter().chain(folders) {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn config(root: &TempDir, cache_dir: Option<PathBuf>) -> DatasetConfig {
        DatasetConfig {
            root_dir: root.path().to_path_buf(),
            shuffle: false,
            clean_threshold: 0.0,
            cache: cache_dir.is_some(),
            cache_dir,
            augment: false,
            ..DatasetConfig::default()
        }
    }

    #[test]
    fn two_folders_yield_two_samples_then_exhaustion() {
        let root = root_with(&["A", "B"]);
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.25)]);
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();

        assert_eq!(ds.len().unwrap(), 2);
        let a = ds.next_sample().unwrap().unwrap();
        let b = ds.next_sample().unwrap().unwrap();
        assert_eq!(a.spectrum, Array1::from_elem(3, 0.5));
        assert_eq!(b.frame, Array2::from_elem((2, 2), 0.25));
        assert!(ds.next_sample().unwrap().is_none());
        assert!(ds.next_sample().unwrap().is_none());
        assert!(ds.next().is_none());
    }

    #[test]
    fn augmentation_produces_five_candidates_for_two_folders() {
        let root = root_with(&["A", "B"]);
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.25)]);
        let mut cfg = config(&root, None);
        cfg.augment = true;
        let mut ds = SpectreDataset::with_reader(cfg, &reader).unwrap();

        assert_eq!(ds.candidates().len(), 5);
        let samples: Vec<Measurement> = ds.by_ref().collect::<Result<_>>().unwrap();
        let means: Vec<f64> = samples.iter().map(|s| s.spectrum[0]).collect();
        assert_eq!(means, vec![0.5, 0.25, 0.125, 0.25, 0.0625]);
        assert_eq!(samples[2].frame, Array2::from_elem((2, 2), 0.125));
    }

    #[test]
    fn cleaning_drops_weak_samples() {
        let root = root_with(&["A", "B", "C"]);
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.125), ("C", 0.25)]);
        let mut cfg = config(&root, None);
        cfg.clean_threshold = 0.25;
        let mut ds = SpectreDataset::with_reader(cfg, &reader).unwrap();

        let names: Vec<_> = ds
            .samples()
            .unwrap()
            .iter()
            .map(|d| d.primary().file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        // Cleaning reads spectra only once per folder.
        assert_eq!(reader.measurement_reads(), 3);
    }

    #[test]
    fn cached_index_is_reused_without_reading_spectra() {
        let root = root_with(&["A", "B", "C", "D"]);
        let cache = tempdir().unwrap();
        let levels = [("A", 0.9), ("B", 0.1), ("C", 0.6), ("D", 0.7)];

        let first_reader = MemoryReader::new(&levels);
        let mut cfg = config(&root, Some(cache.path().join("cache")));
        cfg.augment = true;
        cfg.clean_threshold = 0.3;
        let mut first = SpectreDataset::with_reader(cfg.clone(), &first_reader).unwrap();
        let cleaned = first.samples().unwrap().to_vec();
        assert!(first_reader.measurement_reads() > 0);
        assert!(cache.path().join("cache").join("dataset_cache.json").is_file());

        let second_reader = MemoryReader::new(&levels);
        let mut second = SpectreDataset::with_reader(cfg, &second_reader).unwrap();
        assert_eq!(second.samples().unwrap(), cleaned.as_slice());
        assert_eq!(second_reader.measurement_reads(), 0);
    }

    #[test]
    fn stale_cache_is_ignored_only_when_validating() {
        let root = root_with(&["A", "B"]);
        let cache = tempdir().unwrap();
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.25)]);
        let cfg = config(&root, Some(cache.path().to_path_buf()));
        assert_eq!(SpectreDataset::with_reader(cfg.clone(), &reader).unwrap().len().unwrap(), 2);

        let mut stricter = cfg.clone();
        stricter.clean_threshold = 0.4;
        let mut unvalidated = SpectreDataset::with_reader(stricter.clone(), &reader).unwrap();
        assert_eq!(unvalidated.len().unwrap(), 2);

        stricter.validate_cache = true;
        let mut validated = SpectreDataset::with_reader(stricter, &reader).unwrap();
        assert_eq!(validated.len().unwrap(), 1);
    }

    #[test]
    fn seeded_shuffle_is_a_reproducible_permutation() {
        let names = ["A", "B", "C", "D", "E", "F", "G", "H"];
        let root = root_with(&names);
        let levels: Vec<(&str, f64)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, (i + 1) as f64 / 10.0))
            .collect();
        let reader = MemoryReader::new(&levels);
        let mut cfg = config(&root, None);
        cfg.shuffle = true;
        cfg.seed = Some(7);

        let pass = |cfg: DatasetConfig| -> Vec<f64> {
            SpectreDataset::with_reader(cfg, &reader)
                .unwrap()
                .map(|s| s.unwrap().spectrum[0])
                .collect()
        };
        let first = pass(cfg.clone());
        let second = pass(cfg);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_by(f64::total_cmp);
        let expected: Vec<f64> = levels.iter().map(|(_, l)| *l).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn unseeded_shuffle_is_a_permutation_of_the_cleaned_index() {
        let names = ["A", "B", "C", "D", "E", "F"];
        let root = root_with(&names);
        let levels: Vec<(&str, f64)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, (i + 1) as f64 / 8.0))
            .collect();
        let reader = MemoryReader::new(&levels);
        let mut cfg = config(&root, None);
        cfg.shuffle = true;
        cfg.seed = None;

        let mut ds = SpectreDataset::with_reader(cfg, &reader).unwrap();
        assert!(!ds.is_empty().unwrap());
        assert_eq!(ds.len().unwrap(), names.len());
        let mut seen: Vec<f64> = ds.map(|s| s.unwrap().spectrum[0]).collect();
        seen.sort_by(f64::total_cmp);
        let expected: Vec<f64> = levels.iter().map(|(_, l)| *l).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn disabled_cache_never_touches_the_cache_dir() {
        let root = root_with(&["A", "B"]);
        let scratch = tempdir().unwrap();
        let cache_dir = scratch.path().join("cache");
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.25)]);
        let mut cfg = config(&root, Some(cache_dir.clone()));
        cfg.cache = false;

        let mut ds = SpectreDataset::with_reader(cfg, &reader).unwrap();
        assert_eq!(ds.len().unwrap(), 2);
        assert_eq!(ds.by_ref().count(), 2);
        assert!(!cache_dir.exists());
        assert!(!ds.config().cache_path().exists());
    }

    #[test]
    fn references_are_kept_for_normalization() {
        let root = root_with(&["A"]);
        let reader = MemoryReader::new(&[("A", 0.5)]);
        let ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();
        assert_eq!(ds.normalizer().dark().frame, Array2::<f64>::zeros((2, 2)));
        assert_eq!(ds.normalizer().white().spectrum, Array1::<f64>::ones(3));
        assert_eq!(ds.config().root_dir, root.path());
    }

    #[test]
    fn size_hint_lower_bound_survives_a_read_error() {
        let root = root_with(&["A", "B", "C"]);
        let mut reader = MemoryReader::new(&[("A", 0.5), ("B", 0.5), ("C", 0.5)]);
        reader.missing_frames.push("A".into());
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();
        assert_eq!(ds.len().unwrap(), 3);

        let (lower, upper) = ds.size_hint();
        assert_eq!(upper, Some(3));
        let items = ds.by_ref().count();
        assert_eq!(items, 1);
        assert!(lower <= items);
        assert_eq!(ds.size_hint(), (0, Some(0)));
    }

    #[test]
    fn close_stops_production_without_error() {
        let root = root_with(&["A", "B", "C"]);
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.5), ("C", 0.5)]);
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();

        assert!(ds.next_sample().unwrap().is_some());
        assert_eq!(ds.remaining().unwrap(), 2);
        ds.close();
        ds.close();
        assert!(ds.is_closed());
        assert!(ds.next_sample().unwrap().is_none());
        assert_eq!(ds.remaining().unwrap(), 0);
        assert_eq!(ds.len().unwrap(), 3);
    }

    #[test]
    fn read_error_is_reported_once_then_closes() {
        let root = root_with(&["A", "B"]);
        let mut reader = MemoryReader::new(&[("A", 0.5), ("B", 0.5)]);
        reader.missing_frames.push("B".into());
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();

        // Cleaning never looks at frames, so B survives it.
        assert_eq!(ds.len().unwrap(), 2);
        assert!(ds.next().unwrap().is_ok());
        assert!(matches!(ds.next(), Some(Err(SpectreError::InvalidFormat { .. }))));
        assert!(ds.is_closed());
        assert!(ds.next().is_none());
        assert!(ds.next_sample().unwrap().is_none());
    }

    #[test]
    fn cleaning_failure_aborts_by_default() {
        let root = root_with(&["A", "B"]);
        let reader = MemoryReader::new(&[("A", 0.5)]);
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();
        assert!(matches!(ds.len(), Err(SpectreError::InvalidFormat { .. })));
        assert!(ds.next().unwrap().is_err());
        assert!(ds.next().is_none());
    }

    #[test]
    fn skip_policy_drops_unreadable_samples() {
        let root = root_with(&["A", "B"]);
        let reader = MemoryReader::new(&[("A", 0.5)]);
        let mut cfg = config(&root, None);
        cfg.on_read_error = ReadErrorPolicy::Skip;
        let mut ds = SpectreDataset::with_reader(cfg, &reader).unwrap();
        assert_eq!(ds.len().unwrap(), 1);
        let samples: Vec<_> = ds.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn length_is_fixed_after_first_query() {
        let root = root_with(&["A"]);
        let reader = MemoryReader::new(&[("A", 0.5), ("B", 0.5)]);
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();
        assert_eq!(ds.len().unwrap(), 1);
        fs::create_dir(root.path().join("B")).unwrap();
        assert_eq!(ds.len().unwrap(), 1);
    }

    #[test]
    fn missing_reference_fails_construction() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("White")).unwrap();
        let mut reader = MemoryReader::new(&[]);
        reader.levels.remove("Dark");
        let err = SpectreDataset::with_reader(config(&root, None), &reader).err().unwrap();
        assert!(matches!(err, SpectreError::InvalidFormat { .. }));
    }

    #[test]
    fn normalized_values_never_drop_below_epsilon() {
        let root = root_with(&["A"]);
        let reader = MemoryReader::new(&[("A", -4.0)]);
        let mut ds = SpectreDataset::with_reader(config(&root, None), &reader).unwrap();
        let sample = ds.next().unwrap().unwrap();
        assert!(sample.spectrum.iter().all(|&v| v == EPSILON));
    }
}
