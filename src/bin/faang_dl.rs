use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use faang_downloader::app::{App, Credentials, RunOutcome, RunRequest};
use faang_downloader::auth::TokenHttpClient;
use faang_downloader::config::ConfigLoader;
use faang_downloader::domain::{DataType, PortalMode, StudyId};
use faang_downloader::error::DownloaderError;
use faang_downloader::layout::DirectoryResolver;
use faang_downloader::orchestrator::{DirectoryPolicy, Orchestrator};
use faang_downloader::output::{ConsoleOutput, JsonOutput, OutputMode, write_json_atomic};
use faang_downloader::portal::{MetadataClient, PortalHttpClient};
use faang_downloader::prompt::read_password;
use faang_downloader::transfer::HttpTransfer;

const PASSWORD_ENV: &str = "FAANG_PASSWORD";

#[derive(Parser)]
#[command(name = "faang-dl")]
#[command(about = "Download every file of a FAANG study into a local directory tree")]
#[command(version, author)]
struct Cli {
    #[arg(long, value_enum, default_value_t = PortalMode::Public)]
    mode: PortalMode,

    #[arg(long, alias = "study_id")]
    study_id: String,

    #[arg(long, alias = "download_location")]
    download_location: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DataType::ExperimentFiles)]
    data_type: DataType,

    /// Portal user, required in private mode. The password is read from
    /// FAANG_PASSWORD or prompted for.
    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    abort_on_directory_error: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    non_interactive: bool,

    /// Also write the final report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(outcome) => ExitCode::from(outcome_exit_code(&outcome)),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<DownloaderError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &DownloaderError) -> u8 {
    match error {
        DownloaderError::InvalidStudyId(_)
        | DownloaderError::MissingCredential(_)
        | DownloaderError::ConfigRead(_)
        | DownloaderError::ConfigParse(_)
        | DownloaderError::Auth(_) => 2,
        DownloaderError::Metadata(_) | DownloaderError::MetadataStatus { .. } => 3,
        _ => 1,
    }
}

fn outcome_exit_code(outcome: &RunOutcome) -> u8 {
    match outcome.report() {
        Some(report) if !report.is_success() => 4,
        _ => 0,
    }
}

fn run() -> miette::Result<RunOutcome> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut settings = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        settings.max_workers = workers.max(1);
    }
    if let Some(secs) = cli.timeout_secs {
        settings.transfer_timeout = Duration::from_secs(secs.max(1));
    }

    let study_id: StudyId = cli.study_id.parse()?;
    let credentials = match cli.mode {
        PortalMode::Public => None,
        PortalMode::Private => Some(collect_credentials(cli.user, output_mode)?),
    };

    let policy = if cli.abort_on_directory_error {
        DirectoryPolicy::AbortBatch
    } else {
        DirectoryPolicy::SkipSubset
    };
    let orchestrator = Orchestrator::new(HttpTransfer::new(settings.transfer_timeout)?)
        .with_max_workers(settings.max_workers)
        .with_directory_policy(policy);
    let app = App::new(
        TokenHttpClient::new(&settings.api_base_url)?,
        MetadataClient::new(
            PortalHttpClient::new(&settings.api_base_url)?,
            settings.page_size,
        ),
        DirectoryResolver::new()?,
        orchestrator,
    );

    let request = RunRequest {
        mode: cli.mode,
        study_id,
        data_type: cli.data_type,
        download_location: cli.download_location.or(settings.download_location),
        credentials,
        dry_run: cli.dry_run,
    };

    let outcome = match output_mode {
        OutputMode::NonInteractive => {
            let outcome = app.run(request, &JsonOutput)?;
            JsonOutput::print_outcome(&outcome).into_diagnostic()?;
            outcome
        }
        OutputMode::Interactive => {
            let outcome = app.run(request, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&outcome);
            outcome
        }
    };

    if let Some(path) = cli.report.as_deref() {
        write_json_atomic(path, &outcome)?;
    }
    Ok(outcome)
}

fn collect_credentials(
    user: Option<String>,
    output_mode: OutputMode,
) -> Result<Credentials, DownloaderError> {
    let username = user
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DownloaderError::MissingCredential("please provide --user".to_string()))?;

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(value) if !value.is_empty() => value,
        _ => match output_mode {
            OutputMode::Interactive => read_password("Password: ")
                .map_err(|err| DownloaderError::MissingCredential(err.to_string()))?
                .ok_or_else(|| {
                    DownloaderError::MissingCredential("password prompt aborted".to_string())
                })?,
            OutputMode::NonInteractive => {
                return Err(DownloaderError::MissingCredential(format!(
                    "set {PASSWORD_ENV} in non-interactive mode"
                )));
            }
        },
    };
    if password.is_empty() {
        return Err(DownloaderError::MissingCredential(
            "please provide a password".to_string(),
        ));
    }

    Ok(Credentials { username, password })
}
