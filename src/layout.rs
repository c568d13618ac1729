use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tracing::{debug, warn};

use crate::domain::StudyId;
use crate::error::DownloaderError;

/// Resolves where a study's files are written.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    default_root: Utf8PathBuf,
}

impl DirectoryResolver {
    /// Default root is a `data` directory next to the executable, or the
    /// platform data directory when the executable cannot be located.
    pub fn new() -> Result<Self, DownloaderError> {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("data")))
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok());

        let default_root = match beside_exe {
            Some(root) => root,
            None => BaseDirs::new()
                .and_then(|dirs| {
                    Utf8PathBuf::from_path_buf(dirs.data_dir().join("faang-downloader")).ok()
                })
                .ok_or_else(|| {
                    DownloaderError::Filesystem(
                        "unable to resolve default data directory".to_string(),
                    )
                })?,
        };

        Ok(Self { default_root })
    }

    pub fn new_with_default(default_root: Utf8PathBuf) -> Self {
        Self { default_root }
    }

    pub fn default_root(&self) -> &Utf8Path {
        &self.default_root
    }

    /// Picks the base location: the supplied one when it names an existing
    /// directory, the default root otherwise.
    pub fn base_location(&self, base: Option<&Path>) -> Utf8PathBuf {
        let supplied = base
            .filter(|path| !path.as_os_str().is_empty())
            .filter(|path| path.is_dir())
            .and_then(|path| Utf8PathBuf::from_path_buf(path.to_path_buf()).ok());

        match supplied {
            Some(path) => path,
            None => {
                warn!(
                    default = %self.default_root,
                    "download location not provided or not usable, using default location"
                );
                self.default_root.clone()
            }
        }
    }

    /// `<base>/<study_id>` without touching the filesystem.
    pub fn study_dir(&self, base: Option<&Path>, study_id: &StudyId) -> Utf8PathBuf {
        self.base_location(base).join(study_id.as_str())
    }

    /// `<base>/<study_id>`, created if missing. Safe to call repeatedly.
    pub fn resolve(
        &self,
        base: Option<&Path>,
        study_id: &StudyId,
    ) -> Result<Utf8PathBuf, DownloaderError> {
        let dir = self.study_dir(base, study_id);
        ensure_dir(&dir)?;
        debug!(path = %dir, "study directory ready");
        Ok(dir)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), DownloaderError> {
    fs::create_dir_all(path.as_std_path()).map_err(|err| DownloaderError::Directory {
        path: path.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_base_falls_back_to_default() {
        let temp = tempfile::tempdir().unwrap();
        let default_root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
        let resolver = DirectoryResolver::new_with_default(default_root.clone());

        let missing = temp.path().join("does-not-exist");
        assert_eq!(resolver.base_location(Some(&missing)), default_root);
        assert_eq!(resolver.base_location(Some(Path::new(""))), default_root);
        assert_eq!(resolver.base_location(None), default_root);
    }
}
