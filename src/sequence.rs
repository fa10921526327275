//! Reconstruction of numbered image series (`slice_0001.png`, …) from one
//! member file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Split a file stem into its sequence name and trailing frame index.
///
/// `"scan_0012"` → `("scan_", 12)`. Stems without trailing digits return
/// `None`.
pub fn split_index(stem: &str) -> Option<(&str, u64)> {
    let digits = stem
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let (name, index) = stem.split_at(stem.len() - digits);
    index.parse().ok().map(|index| (name, index))
}

/// Stem and extension of a path, with compound extensions such as
/// `.nii.gz` kept whole.
fn stem_and_extension(path: &Path) -> Option<(String, String)> {
    let file_name = path.file_name()?.to_str()?;
    let lower = file_name.to_ascii_lowercase();
    for compound in [".nii.gz", ".ome.tiff", ".ome.tif"] {
        if lower.ends_with(compound) {
            let cut = file_name.len() - compound.len();
            return Some((file_name[..cut].to_string(), lower[cut + 1..].to_string()));
        }
    }
    let stem = path.file_stem()?.to_str()?.to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    Some((stem, extension))
}

/// Collect the ordered file list of the series `path` belongs to.
///
/// Every file in the same directory with the same extension and sequence
/// name is a candidate. An index whose neighbours `k-1` and `k+1` are both
/// missing is treated as an unrelated stray and dropped. Falls back to
/// `[path]` when nothing qualifies.
pub fn collect_sequence(path: &Path) -> Vec<PathBuf> {
    let single = vec![path.to_path_buf()];
    let Some((stem, extension)) = stem_and_extension(path) else {
        return single;
    };
    let Some((sequence_name, _)) = split_index(&stem) else {
        return single;
    };
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Ok(entries) = fs::read_dir(&directory) else {
        return single;
    };

    let mut by_index = BTreeMap::new();
    for candidate in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        if !candidate.is_file() {
            continue;
        }
        let Some((candidate_stem, candidate_extension)) = stem_and_extension(&candidate) else {
            continue;
        };
        if candidate_extension != extension {
            continue;
        }
        if let Some((name, index)) = split_index(&candidate_stem) {
            if name == sequence_name {
                by_index.insert(index, candidate);
            }
        }
    }

    let isolated: Vec<u64> = by_index
        .keys()
        .copied()
        .filter(|&k| {
            let before = k.checked_sub(1).is_some_and(|p| by_index.contains_key(&p));
            let after = by_index.contains_key(&(k + 1));
            !(before || after)
        })
        .collect();
    for k in isolated {
        by_index.remove(&k);
    }
    let sequence: Vec<PathBuf> = by_index.into_values().collect();

    if sequence.is_empty() {
        log::debug!("{} is not part of a numbered sequence", path.display());
        single
    } else {
        log::debug!(
            "collected {} files for sequence '{}' ({})",
            sequence.len(),
            sequence_name,
            extension
        );
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn splits_trailing_digits() {
        assert_eq!(split_index("name_0012"), Some(("name_", 12)));
        assert_eq!(split_index("7"), Some(("", 7)));
        assert_eq!(split_index("name"), None);
    }

    #[test]
    fn isolated_index_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=5 {
            touch(dir.path(), &format!("name_{i:04}.png"));
        }
        touch(dir.path(), "name_0010.png");
        touch(dir.path(), "other_0002.png");
        touch(dir.path(), "name_0006.jpg");

        let start = dir.path().join("name_0003.png");
        let sequence = collect_sequence(&start);
        let names: Vec<_> = sequence
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "name_0001.png",
                "name_0002.png",
                "name_0003.png",
                "name_0004.png",
                "name_0005.png"
            ]
        );
    }

    #[test]
    fn falls_back_to_single_path() {
        let dir = tempfile::tempdir().unwrap();
        let lonely = touch(dir.path(), "volume_12.png");
        assert_eq!(collect_sequence(&lonely), vec![lonely.clone()]);

        let plain = touch(dir.path(), "volume.png");
        assert_eq!(collect_sequence(&plain), vec![plain.clone()]);
    }

    #[test]
    fn compound_extensions_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "t1_01.nii.gz");
        let b = touch(dir.path(), "t1_02.nii.gz");
        assert_eq!(collect_sequence(&a), vec![a.clone(), b]);
    }
}
