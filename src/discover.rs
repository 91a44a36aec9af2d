use std::path::{Path, PathBuf};

use crate::errors::FruitbenchError;

/// List the benchmark corpora: every sub-directory of `data_dir`.
///
/// Order is whatever the directory listing yields. An unreadable `data_dir`
/// is the one fault that aborts a session.
pub fn discover_corpora(data_dir: &Path) -> Result<Vec<PathBuf>, FruitbenchError> {
    let entries = std::fs::read_dir(data_dir).map_err(|source| FruitbenchError::DataDirUnreadable {
        path: data_dir.to_path_buf(),
        source,
    })?;

    let mut corpora = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if path.is_dir() {
            corpora.push(path);
        }
    }
    Ok(corpora)
}

/// List the input files of one corpus: every regular file directly inside it.
///
/// A corpus that cannot be read yields no inputs; the caller logs and moves on.
pub fn discover_inputs(corpus: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(corpus) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("Cannot list {}: {}", corpus.display(), err);
            return vec![];
        }
    };

    let mut inputs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if path.is_file() {
            inputs.push(path);
        }
    }
    inputs
}
