//! Watcher integration: debounce of chunked writes, extension filtering,
//! the startup sweep, and the missing-folder failure mode.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use sheet_upload_bot::error::{AppError, ConfigError};
use sheet_upload_bot::watcher::FileWatcher;
use sheet_upload_bot::Config;

fn watch_config(dir: &std::path::Path) -> Arc<Config> {
    let config = Config {
        base_url: "http://localhost:5002".to_string(),
        shared_folder: dir.join("shared"),
        debounce_ms: 200,
        ..Config::default()
    };
    fs::create_dir_all(&config.shared_folder).unwrap();
    Arc::new(config)
}

#[tokio::test]
async fn chunked_write_yields_exactly_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = watch_config(dir.path());
    let (mut events, _guard) = FileWatcher::start(Arc::clone(&config)).unwrap();

    // Simulate a slow copy onto the share: two chunks 50ms apart.
    let path = config.shared_folder.join("export.csv");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(b"a1,b1,c1").unwrap();
    file.sync_all().unwrap();
    sleep(Duration::from_millis(50)).await;
    file.write_all(b"\na2,b2,c2").unwrap();
    file.sync_all().unwrap();
    drop(file);

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no arrival event within 5s")
        .expect("watcher channel closed");
    assert_eq!(event.file_name(), "export.csv");
    // The event describes the settled file, both chunks included.
    assert_eq!(event.size, 17);

    // The second chunk must not surface as a second arrival.
    assert!(
        timeout(Duration::from_millis(700), events.recv()).await.is_err(),
        "chunked write produced more than one event"
    );
}

#[tokio::test]
async fn non_matching_extensions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let config = watch_config(dir.path());
    let (mut events, _guard) = FileWatcher::start(Arc::clone(&config)).unwrap();

    fs::write(config.shared_folder.join("notes.txt"), b"not a sheet").unwrap();
    sleep(Duration::from_millis(50)).await;
    fs::write(config.shared_folder.join("data.csv"), b"a,b\n1,2").unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no arrival event within 5s")
        .expect("watcher channel closed");
    assert_eq!(event.file_name(), "data.csv");
    assert!(timeout(Duration::from_millis(500), events.recv()).await.is_err());
}

#[tokio::test]
async fn files_already_present_are_swept_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = watch_config(dir.path());
    fs::write(config.shared_folder.join("left_behind.xlsx"), b"cells").unwrap();

    let (mut events, _guard) = FileWatcher::start(Arc::clone(&config)).unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("startup sweep missed an existing file")
        .expect("watcher channel closed");
    assert_eq!(event.file_name(), "left_behind.xlsx");
}

#[tokio::test]
async fn missing_shared_folder_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        base_url: "http://localhost:5002".to_string(),
        shared_folder: dir.path().join("never_created"),
        ..Config::default()
    });

    let err = FileWatcher::start(config).unwrap_err();
    assert!(matches!(
        err,
        AppError::Config(ConfigError::FolderMissing { .. })
    ));
}
