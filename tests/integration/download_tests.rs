//! Integration tests for the image downloader
//!
//! Images are served by wiremock and written into temporary directories.

use site_gleaner::download::{build_download_client, DownloadJob, Downloader};
use site_gleaner::{DownloadError, DownloadStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader(out_dir: &Path) -> Downloader {
    let client = build_download_client("TestBot/1.0", Duration::from_secs(5), 5).unwrap();
    Downloader::with_client(client, out_dir.to_path_buf(), 4)
}

async fn serve_image(server: &MockServer, route: &str, body: &[u8], expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.to_vec(), "image/jpeg"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_same_name_from_two_hosts_gets_suffix() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    serve_image(&first, "/logo.jpg", b"first", 1).await;
    serve_image(&second, "/logo.jpg", b"second", 1).await;

    let out = tempfile::tempdir().unwrap();
    let records = downloader(out.path())
        .download_all(vec![
            DownloadJob::new(format!("{}/logo.jpg", first.uri())),
            DownloadJob::new(format!("{}/logo.jpg", second.uri())),
        ])
        .await;

    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.status == DownloadStatus::Downloaded));

    let mut paths: Vec<PathBuf> = records.iter().filter_map(|r| r.path.clone()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![out.path().join("logo.jpg"), out.path().join("logo_1.jpg")]
    );

    let mut contents: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
    contents.sort();
    assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
}

#[tokio::test]
async fn test_second_run_skips_existing_files() {
    let server = MockServer::start().await;
    // One request across both runs
    serve_image(&server, "/img/photo.jpg", b"jpeg bytes", 1).await;

    let out = tempfile::tempdir().unwrap();
    let url = format!("{}/img/photo.jpg", server.uri());

    let first = downloader(out.path()).download(&url).await;
    assert_eq!(first.status, DownloadStatus::Downloaded);
    assert_eq!(first.size, 10);

    let second = downloader(out.path()).download(&url).await;
    assert_eq!(second.status, DownloadStatus::AlreadyPresent);
    assert_eq!(second.path, Some(out.path().join("img/photo.jpg")));
    assert_eq!(second.size, 10);
}

#[tokio::test]
async fn test_http_error_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let record = downloader(out.path())
        .download(&format!("{}/gone.png", server.uri()))
        .await;

    assert_eq!(
        record.status,
        DownloadStatus::Failed {
            error: DownloadError::Status(404)
        }
    );
    assert!(!out.path().join("gone.png").exists());
    assert!(!out.path().join("gone.png.part").exists());
}

#[tokio::test]
async fn test_each_url_fetched_at_most_once() {
    let server = MockServer::start().await;
    serve_image(&server, "/a.png", b"a", 1).await;
    serve_image(&server, "/b.png", b"b", 1).await;

    let out = tempfile::tempdir().unwrap();
    let downloader = downloader(out.path());
    let a = format!("{}/a.png", server.uri());
    let b = format!("{}/b.png", server.uri());

    let records = downloader
        .download_all(vec![
            DownloadJob::new(a.clone()),
            DownloadJob::new(b.clone()),
            DownloadJob::new(a.clone()),
        ])
        .await;
    assert_eq!(records.len(), 2);

    // A later request for a settled URL returns the stored record
    let again = downloader.download(&a).await;
    assert_eq!(again.status, DownloadStatus::Downloaded);
    assert_eq!(again.path, Some(out.path().join("a.png")));
    assert_eq!(downloader.records().len(), 2);
}

#[tokio::test]
async fn test_redirects_are_bounded() {
    let server = MockServer::start().await;
    for hop in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/hop{}.png", hop)))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("/hop{}.png", hop + 1).as_str()),
            )
            .mount(&server)
            .await;
    }
    serve_image(&server, "/hop3.png", b"finally", 0).await;

    let out = tempfile::tempdir().unwrap();
    let client = build_download_client("TestBot/1.0", Duration::from_secs(5), 2).unwrap();
    let record = Downloader::with_client(client, out.path().to_path_buf(), 1)
        .download(&format!("{}/hop0.png", server.uri()))
        .await;

    assert!(matches!(
        record.status,
        DownloadStatus::Failed {
            error: DownloadError::Network(_)
        }
    ));
}

#[tokio::test]
async fn test_folder_jobs_land_in_subfolder() {
    let server = MockServer::start().await;
    serve_image(&server, "/banner", b"png", 1).await;

    let out = tempfile::tempdir().unwrap();
    let record = downloader(out.path())
        .download_job(DownloadJob::in_folder(
            format!("{}/banner", server.uri()),
            "brand",
        ))
        .await;

    assert_eq!(record.status, DownloadStatus::Downloaded);
    assert_eq!(record.path, Some(out.path().join("brand/banner.jpg")));
    assert!(out.path().join("brand/banner.jpg").is_file());
}

#[tokio::test]
async fn test_batch_respects_concurrency_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"slow".to_vec(), "image/png")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(6)
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let client = build_download_client("TestBot/1.0", Duration::from_secs(5), 5).unwrap();
    let downloader = Downloader::with_client(client, out.path().to_path_buf(), 2);
    let jobs = (0..6)
        .map(|i| DownloadJob::new(format!("{}/slow{}.png", server.uri(), i)))
        .collect();

    let started = std::time::Instant::now();
    let records = downloader.download_all(jobs).await;
    let elapsed = started.elapsed();

    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.status == DownloadStatus::Downloaded));
    // Two at a time means three rounds of 300ms
    assert!(
        elapsed >= Duration::from_millis(900),
        "6 downloads at concurrency 2 finished in {:?}",
        elapsed
    );
}
