//! Document sink: a file path or stdout.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to render report as JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] std::io::Error),
}

/// Writes `document` to `path`, creating missing parent directories, or to stdout when
/// no path is given.
pub fn write_document(path: Option<&Path>, document: &str) -> Result<(), OutputError> {
    let Some(path) = path else {
        let mut stdout = std::io::stdout().lock();
        return stdout
            .write_all(document.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(OutputError::Stdout);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, document).map_err(|source| OutputError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = document.len(), "report written");
    Ok(())
}
