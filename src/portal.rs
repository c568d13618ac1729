use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{AccessToken, DataType, DownloadDescriptor, PortalMode, StudyBatch, StudyId};
use crate::error::DownloaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingKind {
    ExperimentFiles,
    Analyses,
}

/// One search request against the portal.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    pub mode: PortalMode,
    pub study_id: &'a StudyId,
    pub token: Option<&'a AccessToken>,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileRecord {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

#[derive(Deserialize)]
struct SearchResponse<T> {
    hits: HitList<T>,
}

#[derive(Deserialize)]
struct HitList<T> {
    #[serde(default = "Vec::new")]
    hits: Vec<Hit<T>>,
}

#[derive(Deserialize)]
struct Hit<T> {
    #[serde(rename = "_source")]
    source: T,
}

/// Parses a `hits.hits[]._source` search body.
pub fn parse_hits<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, DownloaderError> {
    let response: SearchResponse<T> =
        serde_json::from_str(body).map_err(|err| DownloaderError::Metadata(err.to_string()))?;
    Ok(response.hits.hits.into_iter().map(|hit| hit.source).collect())
}

pub trait PortalClient: Send + Sync {
    fn search_files(&self, query: &SearchQuery<'_>) -> Result<Vec<FileRecord>, DownloaderError>;
    fn search_analyses(
        &self,
        query: &SearchQuery<'_>,
    ) -> Result<Vec<AnalysisRecord>, DownloaderError>;
}

#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
    base_url: String,
}

impl PortalHttpClient {
    pub fn new(base_url: &str) -> Result<Self, DownloaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-dl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::Metadata(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| DownloaderError::Metadata(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn search_url(&self, mode: PortalMode, kind: ListingKind) -> String {
        let path = match (mode, kind) {
            (PortalMode::Private, ListingKind::ExperimentFiles) => "private_portal/file/",
            (PortalMode::Private, ListingKind::Analyses) => "private_portal/analysis/",
            (PortalMode::Public, ListingKind::ExperimentFiles) => "data/file/_search/",
            (PortalMode::Public, ListingKind::Analyses) => "data/analysis/_search/",
        };
        format!("{}/{}", self.base_url, path)
    }

    fn search_body(
        &self,
        kind: ListingKind,
        query: &SearchQuery<'_>,
    ) -> Result<String, DownloaderError> {
        let url = self.search_url(query.mode, kind);
        let size = query.size.to_string();
        let mut request = self.client.get(&url).query(&[
            ("size", size.as_str()),
            ("from_", "0"),
            ("search", query.study_id.as_str()),
        ]);
        if query.mode == PortalMode::Private {
            let token = query.token.ok_or_else(|| {
                DownloaderError::MissingCredential("private portal requires a token".to_string())
            })?;
            let value = HeaderValue::from_str(&format!("jwt {}", token.as_str()))
                .map_err(|err| DownloaderError::Metadata(err.to_string()))?;
            request = request.header(AUTHORIZATION, value);
        }

        debug!(url = %url, study = %query.study_id, "portal search");
        let response = request
            .send()
            .map_err(|err| DownloaderError::Metadata(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "portal request failed".to_string());
            return Err(DownloaderError::MetadataStatus { status, message });
        }
        response
            .text()
            .map_err(|err| DownloaderError::Metadata(err.to_string()))
    }
}

impl PortalClient for PortalHttpClient {
    fn search_files(&self, query: &SearchQuery<'_>) -> Result<Vec<FileRecord>, DownloaderError> {
        let body = self.search_body(ListingKind::ExperimentFiles, query)?;
        parse_hits(&body)
    }

    fn search_analyses(
        &self,
        query: &SearchQuery<'_>,
    ) -> Result<Vec<AnalysisRecord>, DownloaderError> {
        let body = self.search_body(ListingKind::Analyses, query)?;
        parse_hits(&body)
    }
}

#[derive(Debug, Clone)]
pub enum Listing {
    Files {
        batch: StudyBatch,
        /// Listings whose hit count reached the page size.
        truncated: Vec<ListingKind>,
    },
    Empty,
}

/// Turns portal search results into a batch of descriptors.
pub struct MetadataClient<P: PortalClient> {
    portal: P,
    page_size: usize,
}

impl<P: PortalClient> MetadataClient<P> {
    pub fn new(portal: P, page_size: usize) -> Self {
        Self { portal, page_size }
    }

    pub fn list_files(
        &self,
        mode: PortalMode,
        study_id: &StudyId,
        data_type: DataType,
        token: Option<&AccessToken>,
        destination: &Utf8Path,
    ) -> Result<Listing, DownloaderError> {
        if mode == PortalMode::Private && token.is_none() {
            return Err(DownloaderError::MissingCredential(
                "private portal requires a token".to_string(),
            ));
        }
        let query = SearchQuery {
            mode,
            study_id,
            token,
            size: self.page_size,
        };

        let mut descriptors = Vec::new();
        let mut truncated = Vec::new();

        if data_type.includes_experiments() {
            let records = tolerate_status(
                ListingKind::ExperimentFiles,
                self.portal.search_files(&query),
            )?;
            if self.reached_page_size(ListingKind::ExperimentFiles, records.len()) {
                truncated.push(ListingKind::ExperimentFiles);
            }
            descriptors.extend(experiment_descriptors(&records, destination));
        }

        if data_type.includes_analyses() {
            let records =
                tolerate_status(ListingKind::Analyses, self.portal.search_analyses(&query))?;
            if self.reached_page_size(ListingKind::Analyses, records.len()) {
                truncated.push(ListingKind::Analyses);
            }
            descriptors.extend(analysis_descriptors(&records, destination));
        }

        if descriptors.is_empty() {
            return Ok(Listing::Empty);
        }
        info!(study = %study_id, files = descriptors.len(), "study listing resolved");
        Ok(Listing::Files {
            batch: StudyBatch::new(study_id.clone(), data_type, descriptors),
            truncated,
        })
    }

    fn reached_page_size(&self, kind: ListingKind, hits: usize) -> bool {
        let reached = hits >= self.page_size;
        if reached {
            warn!(
                listing = ?kind,
                page_size = self.page_size,
                "listing filled a whole page; more records may exist and were not fetched"
            );
        }
        reached
    }
}

fn tolerate_status<T>(
    kind: ListingKind,
    result: Result<Vec<T>, DownloaderError>,
) -> Result<Vec<T>, DownloaderError> {
    match result {
        Err(DownloaderError::MetadataStatus { status, message }) => {
            warn!(listing = ?kind, status, message = %message, "portal returned no listing");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Portal URLs carry no scheme; the files are served from FTP hosts.
pub fn source_url(raw: &str) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("ftp://{}", raw.trim_start_matches('/'))
    }
}

fn descriptor_from(record: &FileRecord, destination: &Utf8Path) -> Option<DownloadDescriptor> {
    let (Some(url), Some(name)) = (record.url.as_deref(), record.name.as_deref()) else {
        warn!(?record, "skipping file record without url or name");
        return None;
    };
    match DownloadDescriptor::new(source_url(url), name, destination) {
        Ok(descriptor) => Some(descriptor),
        Err(err) => {
            warn!(error = %err, "skipping file record");
            None
        }
    }
}

pub fn experiment_descriptors(
    records: &[FileRecord],
    destination: &Utf8Path,
) -> Vec<DownloadDescriptor> {
    records
        .iter()
        .filter_map(|record| descriptor_from(record, destination))
        .collect()
}

/// Analysis files are namespaced by the analysis accession.
pub fn analysis_descriptors(
    records: &[AnalysisRecord],
    destination: &Utf8Path,
) -> Vec<DownloadDescriptor> {
    let mut descriptors = Vec::new();
    for analysis in records {
        let Some(accession) = analysis
            .accession
            .as_deref()
            .filter(|value| crate::domain::is_plain_file_name(value))
        else {
            warn!(accession = ?analysis.accession, "skipping analysis without a usable accession");
            continue;
        };
        let dir = destination.join(accession);
        descriptors.extend(
            analysis
                .files
                .iter()
                .filter_map(|record| descriptor_from(record, &dir)),
        );
    }
    descriptors
}
