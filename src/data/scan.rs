use std::path::{Path, PathBuf};

use super::loader::{DARK_DIR, WHITE_DIR};
use super::model::SampleDescriptor;
use crate::error::{Result, SpectreError};

/// Entries whose name starts with this character are ignored.
const HIDDEN_MARKER: char = '.';

/// List the measurement entries directly under `root`, sorted by name.
///
/// Hidden entries and the two reference folders are skipped.
pub fn measurement_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|e| SpectreError::io(root, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SpectreError::io(root, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(HIDDEN_MARKER) || name == DARK_DIR || name == WHITE_DIR {
            continue;
        }
        names.push(entry.file_name());
    }
    names.sort();
    Ok(names.into_iter().map(|n| root.join(n)).collect())
}

/// Build the candidate index from the measurement folders.
///
/// Without augmentation every folder is one singular sample. With it the list
/// is followed by every (first half, second half) pair and then by every
/// folder paired with itself. The halves split at `len / 2`, so an odd
/// leftover lands in the second half.
pub fn expand_candidates(folders: &[PathBuf], augment: bool) -> Vec<SampleDescriptor> {
    let singular = folders.iter().cloned().map(SampleDescriptor::Singular);
    if !augment {
        return singular.collect();
    }

    let (first, second) = folders.split_at(folders.len() / 2);
    let cross = first.iter().flat_map(move |a| {
        second
            .iter()
            .map(move |b| SampleDescriptor::Augmented(a.clone(), b.clone()))
    });
    let square = folders
        .iter()
        .map(|p| SampleDescriptor::Augmented(p.clone(), p.clone()));

    singular.chain(cross).chain(square).collect()
}

/// Scan `root` and expand it into candidate samples.
pub fn scan_root(root: &Path, augment: bool) -> Result<Vec<SampleDescriptor>> {
    let folders = measurement_folders(root)?;
    let candidates = expand_candidates(&folders, augment);
    log::debug!(
        "scanned {}: {} measurements, {} candidate samples",
        root.display(),
        folders.len(),
        candidates.len()
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn folders(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn candidate_count_matches_pairing_formula() {
        for n in 0..9usize {
            let names: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
            let list: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
            assert_eq!(expand_candidates(&list, false).len(), n);
            assert_eq!(
                expand_candidates(&list, true).len(),
                n + (n / 2) * n.div_ceil(2) + n,
                "n = {n}"
            );
        }
    }

    #[test]
    fn two_folders_expand_to_five_candidates() {
        let c = expand_candidates(&folders(&["A", "B"]), true);
        assert_eq!(
            c,
            vec![
                SampleDescriptor::Singular("A".into()),
                SampleDescriptor::Singular("B".into()),
                SampleDescriptor::Augmented("A".into(), "B".into()),
                SampleDescriptor::Augmented("A".into(), "A".into()),
                SampleDescriptor::Augmented("B".into(), "B".into()),
            ]
        );
    }

    #[test]
    fn odd_leftover_falls_in_second_half() {
        let c = expand_candidates(&folders(&["A", "B", "C"]), true);
        let cross: Vec<_> = c[3..5].to_vec();
        assert_eq!(
            cross,
            vec![
                SampleDescriptor::Augmented("A".into(), "B".into()),
                SampleDescriptor::Augmented("A".into(), "C".into()),
            ]
        );
        assert_eq!(c.len(), 3 + 2 + 3);
    }

    #[test]
    fn scan_skips_hidden_and_reference_entries() {
        let dir = tempdir().unwrap();
        for name in ["Dark", "White", ".git", "b_meas", "a_meas"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join(".DS_Store"), "").unwrap();

        let found = measurement_folders(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a_meas"), dir.path().join("b_meas")]);
    }

    #[test]
    fn scan_of_missing_root_fails() {
        let dir = tempdir().unwrap();
        let err = scan_root(&dir.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, SpectreError::Io { .. }));
    }
}
