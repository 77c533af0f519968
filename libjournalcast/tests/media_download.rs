//! Media downloads against a local HTTP server

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use axum::{http::StatusCode, response::Redirect, routing::get, Router};
use tempfile::TempDir;

use libjournalcast::error::{JournalcastError, MediaError};
use libjournalcast::media::MediaResolver;

const IMAGE: &[u8] = b"\x89PNG fake image bytes";

async fn serve() -> Result<String> {
    let app = Router::new()
        .route("/start", get(|| async { Redirect::temporary("/middle") }))
        .route("/middle", get(|| async { Redirect::permanent("/cover.png") }))
        .route("/cover.png", get(|| async { IMAGE.to_vec() }))
        .route("/loop", get(|| async { Redirect::temporary("/loop") }))
        .route("/gone.jpg", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/slow.jpg",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                IMAGE.to_vec()
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(format!("http://{}", addr))
}

fn resolver(dir: &Path, timeout: Duration) -> MediaResolver {
    MediaResolver::new(dir.to_path_buf(), 3, timeout).unwrap()
}

#[tokio::test]
async fn test_follows_redirect_chain_into_temp_file() -> Result<()> {
    let base = serve().await?;
    let dir = TempDir::new()?;
    let source = format!("{}/start", base);

    let asset = resolver(dir.path(), Duration::from_secs(5))
        .resolve(&source)
        .await?;

    assert!(asset.is_temporary);
    assert_eq!(asset.source_ref, source);
    assert_eq!(std::fs::read(asset.path())?, IMAGE);
    // Extension comes from the final URL, not the first one
    assert_eq!(asset.path().extension().unwrap(), "png");
    assert!(asset.path().starts_with(dir.path()));

    let path = asset.path().to_path_buf();
    asset.cleanup();
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn test_dropping_asset_removes_download() -> Result<()> {
    let base = serve().await?;
    let dir = TempDir::new()?;

    let asset = resolver(dir.path(), Duration::from_secs(5))
        .resolve(&format!("{}/cover.png", base))
        .await?;
    let path = asset.path().to_path_buf();
    assert!(path.exists());

    drop(asset);
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn test_redirect_loop_stops_at_limit() -> Result<()> {
    let base = serve().await?;
    let dir = TempDir::new()?;

    let err = resolver(dir.path(), Duration::from_secs(5))
        .resolve(&format!("{}/loop", base))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JournalcastError::Media(MediaError::TooManyRedirects { max: 3, .. })
    ));
    // Nothing written for a failed download
    assert!(!dir.path().exists() || std::fs::read_dir(dir.path())?.count() == 0);
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_http_error() -> Result<()> {
    let base = serve().await?;
    let dir = TempDir::new()?;

    let err = resolver(dir.path(), Duration::from_secs(5))
        .resolve(&format!("{}/gone.jpg", base))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JournalcastError::Media(MediaError::Http { status: 404, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_slow_server_times_out() -> Result<()> {
    let base = serve().await?;
    let dir = TempDir::new()?;

    let err = resolver(dir.path(), Duration::from_millis(300))
        .resolve(&format!("{}/slow.jpg", base))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JournalcastError::Media(MediaError::DownloadTimeout(_))
    ));
    Ok(())
}
