use crate::error::{RegionRasterError, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// List files in `dir` whose names contain the `patterns_in` substrings and none of `patterns_out`.
///
/// With `include_all_patterns` every inclusion pattern must be present in a single
/// name; otherwise one is enough. Exclusion patterns are always applied in full.
/// An empty result is not an error, only a warning.
pub fn list_filepaths<S: AsRef<str>>(
    dir: &Path,
    patterns_in: &[S],
    patterns_out: &[S],
    include_all_patterns: bool,
) -> Result<Vec<PathBuf>> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name_matches(&name, patterns_in, patterns_out, include_all_patterns) {
            names.push(name);
        }
    }
    names.sort();

    if names.is_empty() {
        warn!(
            "No paths found for the specified patterns ({:?}) in {}",
            patterns_in.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            dir.display()
        );
    } else {
        debug!("{} file(s) matched in {}", names.len(), dir.display());
    }

    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// Resolve exactly one file matching all of `patterns_in`.
pub fn find_unique_file<S: AsRef<str>>(
    dir: &Path,
    patterns_in: &[S],
    patterns_out: &[S],
) -> Result<PathBuf> {
    let mut matches = list_filepaths(dir, patterns_in, patterns_out, true)?;
    let patterns = || patterns_in.iter().map(|p| p.as_ref().to_string()).collect();

    match matches.len() {
        0 => Err(RegionRasterError::NoMatchingFile {
            dir: dir.to_path_buf(),
            patterns: patterns(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(RegionRasterError::AmbiguousMatch {
            dir: dir.to_path_buf(),
            patterns: patterns(),
            count,
        }),
    }
}

fn name_matches<S: AsRef<str>>(
    name: &str,
    patterns_in: &[S],
    patterns_out: &[S],
    include_all_patterns: bool,
) -> bool {
    let included = if include_all_patterns {
        patterns_in.iter().all(|p| name.contains(p.as_ref()))
    } else {
        patterns_in.iter().any(|p| name.contains(p.as_ref()))
    };
    included && patterns_out.iter().all(|p| !name.contains(p.as_ref()))
}
