use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DownloaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PortalMode {
    #[default]
    Public,
    Private,
}

impl fmt::Display for PortalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalMode::Public => write!(f, "public"),
            PortalMode::Private => write!(f, "private"),
        }
    }
}

/// Which listings of a study are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    #[default]
    ExperimentFiles,
    AnalysisFiles,
    Both,
}

impl DataType {
    pub fn includes_experiments(self) -> bool {
        matches!(self, DataType::ExperimentFiles | DataType::Both)
    }

    pub fn includes_analyses(self) -> bool {
        matches!(self, DataType::AnalysisFiles | DataType::Both)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::ExperimentFiles => write!(f, "experiment-files"),
            DataType::AnalysisFiles => write!(f, "analysis-files"),
            DataType::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyId(String);

impl StudyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudyId {
    type Err = DownloaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            && !trimmed.chars().all(|ch| ch == '.');
        if !is_valid {
            return Err(DownloaderError::InvalidStudyId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A single planned transfer. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadDescriptor {
    source_url: String,
    file_name: String,
    destination_dir: Utf8PathBuf,
}

impl DownloadDescriptor {
    pub fn new(
        source_url: impl Into<String>,
        file_name: impl Into<String>,
        destination_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, DownloaderError> {
        let file_name = file_name.into();
        if !is_plain_file_name(&file_name) {
            return Err(DownloaderError::InvalidFileName(file_name));
        }
        Ok(Self {
            source_url: source_url.into(),
            file_name,
            destination_dir: destination_dir.into(),
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn destination_dir(&self) -> &Utf8Path {
        &self.destination_dir
    }

    pub fn destination_path(&self) -> Utf8PathBuf {
        self.destination_dir.join(&self.file_name)
    }
}

/// Names coming from the portal end up as path components, so they must not
/// escape the destination directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyBatch {
    study_id: StudyId,
    data_type: DataType,
    descriptors: Vec<DownloadDescriptor>,
}

impl StudyBatch {
    pub fn new(
        study_id: StudyId,
        data_type: DataType,
        descriptors: Vec<DownloadDescriptor>,
    ) -> Self {
        Self {
            study_id,
            data_type,
            descriptors,
        }
    }

    pub fn study_id(&self) -> &StudyId {
        &self.study_id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn descriptors(&self) -> &[DownloadDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}
