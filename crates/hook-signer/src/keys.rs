use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SignerError;

/// Restricts a just-created file or directory to owner-only access.
/// A no-op on platforms without POSIX permission bits.
pub(crate) fn restrict_to_owner(path: &Path, dir: bool) -> Result<(), SignerError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if dir { 0o700 } else { 0o600 };
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
            SignerError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        let _ = path;
    }
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> SignerError {
    SignerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Ensures `dir` exists with owner-only permissions.
pub(crate) fn ensure_key_dir(dir: &Path) -> Result<(), SignerError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    restrict_to_owner(dir, true)
}

/// Reads a hex-encoded key file, returning `None` if it does not exist yet.
pub(crate) fn read_hex_key(path: &Path) -> Result<Option<Vec<u8>>, SignerError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let bytes = hex::decode(contents.trim())
                .map_err(|_| SignerError::KeyGeneration(format!("corrupt key file at {}", path.display())))?;
            Ok(Some(bytes))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Writes `bytes` hex-encoded to `path` with owner-only permissions.
pub(crate) fn write_hex_key(path: &Path, bytes: &[u8]) -> Result<(), SignerError> {
    fs::write(path, hex::encode(bytes)).map_err(|e| io_err(path, e))?;
    restrict_to_owner(path, false)
}

/// A disk location a key manager persists its master key under.
#[derive(Debug, Clone)]
pub struct KeyStore {
    pub dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn key_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}
