mod support;

use std::net::TcpListener;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use faang_downloader::domain::DownloadDescriptor;
use faang_downloader::error::DownloaderError;
use faang_downloader::transfer::{HttpTransfer, Transfer};

use support::{serve_once, serve_trickle};

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn successful_transfer_overwrites_existing_file() {
    let (_temp, root) = temp_root();
    std::fs::write(root.join("sample.txt").as_std_path(), b"stale content").unwrap();
    let (addr, _request) = serve_once("HTTP/1.1 200 OK", "fresh");

    let descriptor =
        DownloadDescriptor::new(format!("http://{addr}/sample.txt"), "sample.txt", &root).unwrap();
    let transfer = HttpTransfer::new(Duration::from_secs(10)).unwrap();
    let bytes = transfer.fetch(&descriptor).unwrap();

    assert_eq!(bytes, 5);
    assert_eq!(
        std::fs::read_to_string(root.join("sample.txt").as_std_path()).unwrap(),
        "fresh"
    );
}

#[test]
fn error_status_fails_without_touching_destination() {
    let (_temp, root) = temp_root();
    let (addr, _request) = serve_once("HTTP/1.1 404 Not Found", "missing");

    let descriptor =
        DownloadDescriptor::new(format!("http://{addr}/gone.txt"), "gone.txt", &root).unwrap();
    let transfer = HttpTransfer::new(Duration::from_secs(10)).unwrap();
    let err = transfer.fetch(&descriptor).unwrap_err();

    assert_matches!(err, DownloaderError::TransferStatus { status: 404, .. });
    assert!(!root.join("gone.txt").as_std_path().exists());
}

#[test]
fn trickling_body_is_cut_off_at_the_timeout() {
    let (_temp, root) = temp_root();
    let addr = serve_trickle(b"twenty bytes of data", Duration::from_millis(300));

    let descriptor =
        DownloadDescriptor::new(format!("http://{addr}/slow.bin"), "slow.bin", &root).unwrap();
    let transfer = HttpTransfer::new(Duration::from_secs(1)).unwrap();
    let started = Instant::now();
    let err = transfer.fetch(&descriptor).unwrap_err();

    assert_matches!(err, DownloaderError::Transfer { .. });
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!root.join("slow.bin").as_std_path().exists());
}

#[test]
fn refused_connection_is_a_transfer_error() {
    let (_temp, root) = temp_root();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let descriptor =
        DownloadDescriptor::new(format!("http://{addr}/x.txt"), "x.txt", &root).unwrap();
    let transfer = HttpTransfer::new(Duration::from_secs(10)).unwrap();
    let err = transfer.fetch(&descriptor).unwrap_err();

    assert_matches!(err, DownloaderError::Transfer { .. });
}

#[test]
fn unsupported_scheme_is_rejected_before_any_request() {
    let (_temp, root) = temp_root();
    let descriptor = DownloadDescriptor::new("s3://bucket/x.txt", "x.txt", &root).unwrap();
    let transfer = HttpTransfer::new(Duration::from_secs(10)).unwrap();

    assert_matches!(
        transfer.fetch(&descriptor),
        Err(DownloaderError::UnsupportedScheme(_))
    );
}
