use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::auth::Authorizer;
use crate::domain::{AccessToken, DataType, DownloadDescriptor, PortalMode, StudyId};
use crate::error::DownloaderError;
use crate::layout::{DirectoryResolver, ensure_dir};
use crate::orchestrator::{BatchReport, Orchestrator};
use crate::portal::{Listing, ListingKind, MetadataClient, PortalClient};
use crate::transfer::Transfer;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: PortalMode,
    pub study_id: StudyId,
    pub data_type: DataType,
    pub download_location: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RunOutcome {
    /// The portal had no files for the study; nothing was written.
    Empty { study_id: String },
    Planned {
        study_id: String,
        destination: Utf8PathBuf,
        files: Vec<DownloadDescriptor>,
        truncated: Vec<ListingKind>,
    },
    Completed {
        destination: Utf8PathBuf,
        truncated: Vec<ListingKind>,
        report: BatchReport,
    },
}

impl RunOutcome {
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            RunOutcome::Completed { report, .. } => Some(report),
            _ => None,
        }
    }
}

pub struct App<A: Authorizer, P: PortalClient, T: Transfer> {
    authorizer: A,
    metadata: MetadataClient<P>,
    resolver: DirectoryResolver,
    orchestrator: Orchestrator<T>,
}

impl<A: Authorizer, P: PortalClient, T: Transfer> App<A, P, T> {
    pub fn new(
        authorizer: A,
        metadata: MetadataClient<P>,
        resolver: DirectoryResolver,
        orchestrator: Orchestrator<T>,
    ) -> Self {
        Self {
            authorizer,
            metadata,
            resolver,
            orchestrator,
        }
    }

    pub fn run(
        &self,
        request: RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, DownloaderError> {
        let token = self.authorize(&request, sink)?;

        let destination = self
            .resolver
            .study_dir(request.download_location.as_deref(), &request.study_id);

        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; listing {} for {} ({})",
                request.data_type, request.study_id, request.mode
            ),
            elapsed: None,
        });
        let start = std::time::Instant::now();
        let listing = self.metadata.list_files(
            request.mode,
            &request.study_id,
            request.data_type,
            token.as_ref(),
            &destination,
        )?;
        sink.event(ProgressEvent {
            message: "portal.response".to_string(),
            elapsed: Some(start.elapsed()),
        });

        let (batch, truncated) = match listing {
            Listing::Empty => {
                sink.event(ProgressEvent {
                    message: format!("No files found for the study {}", request.study_id),
                    elapsed: None,
                });
                return Ok(RunOutcome::Empty {
                    study_id: request.study_id.to_string(),
                });
            }
            Listing::Files { batch, truncated } => (batch, truncated),
        };

        if request.dry_run {
            return Ok(RunOutcome::Planned {
                study_id: request.study_id.to_string(),
                destination,
                files: batch.descriptors().to_vec(),
                truncated,
            });
        }

        ensure_dir(&destination)?;
        info!(path = %destination, files = batch.len(), "downloading study");
        sink.event(ProgressEvent {
            message: format!("phase=Download; {} files into {destination}", batch.len()),
            elapsed: None,
        });
        let report = self.orchestrator.run(&batch, sink)?;

        Ok(RunOutcome::Completed {
            destination,
            truncated,
            report,
        })
    }

    fn authorize(
        &self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<Option<AccessToken>, DownloaderError> {
        if request.mode == PortalMode::Public {
            return Ok(None);
        }
        let credentials = request.credentials.as_ref().ok_or_else(|| {
            DownloaderError::MissingCredential(
                "user and password are required in private mode".to_string(),
            )
        })?;
        sink.event(ProgressEvent {
            message: format!("phase=Auth; authorizing {}", credentials.username),
            elapsed: None,
        });
        self.authorizer
            .authorize(&credentials.username, &credentials.password)
            .map(Some)
    }
}
