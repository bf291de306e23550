//! Integration tests for SFTP transfers.
//!
//! These tests require the `mock` feature to be enabled.

#![cfg(feature = "mock")]

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ssh_driver::engine::flags;
use ssh_driver::mock::{self, MockDriver, MockServer};
use ssh_driver::{DriverConfig, DriverError};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn config() -> DriverConfig {
    DriverConfig::new("files")
        .user("tester")
        .allow_agent(false)
        .identities(Vec::<PathBuf>::new())
        .password("pw")
        .chunk_size(4)
}

async fn connect(server: &MockServer) -> MockDriver {
    mock::driver(server, config()).await.unwrap()
}

/// Records the message of every warning.
#[derive(Clone, Default)]
struct Warnings(Arc<Mutex<Vec<String>>>);

struct Message(String);

impl Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for Warnings {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            let mut message = Message(String::new());
            event.record(&mut message);
            self.0.lock().unwrap().push(message.0);
        }
    }
}

/// Contents survive a put and a get for sizes around the chunk size.
#[tokio::test]
async fn round_trip_preserves_contents() {
    let server = MockServer::new().would_block(1).accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();

    for size in [0_usize, 1, 4, 8, 12] {
        let content: Vec<u8> = (0..size).map(|i| (i * 7 % 251) as u8).collect();
        let local = dir.path().join(format!("up-{size}"));
        std::fs::write(&local, &content).unwrap();

        let remote = format!("/data/out/file-{size}");
        assert_eq!(driver.copy_file(&local, &remote, false).await.unwrap(), 1);
        assert_eq!(server.file(&remote).unwrap(), content);

        let back = dir.path().join(format!("down-{size}"));
        assert_eq!(driver.copy_remote_file(&remote, &back, false).await.unwrap(), 1);
        assert_eq!(std::fs::read(&back).unwrap(), content);
    }

    assert_eq!(server.sftp_inits(), 1);
    assert!(server.waits() > 0);
}

#[tokio::test]
async fn mkdir_chain_is_idempotent() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;

    driver.mkdir("/a/b/c").await.unwrap();
    assert_eq!(server.mkdir_calls(), vec!["/a", "/a/b", "/a/b/c"]);
    assert!(server.is_dir("/a/b/c"));

    driver.mkdir("/a/b/c").await.unwrap();
    assert_eq!(server.mkdir_calls().len(), 3);
}

#[tokio::test]
async fn mkdir_chain_skips_existing_prefix() {
    let server = MockServer::new().accept_password("pw").with_dir("/srv");
    let mut driver = connect(&server).await;

    driver.mkdir("/srv//app/").await.unwrap();
    assert_eq!(server.mkdir_calls(), vec!["/srv/app"]);
}

#[tokio::test]
async fn recursive_put_mirrors_the_tree() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("site");
    std::fs::create_dir_all(root.join("css/vendor")).unwrap();
    std::fs::write(root.join("index.html"), "<html>").unwrap();
    std::fs::write(root.join("css/main.css"), "body{}").unwrap();
    std::fs::write(root.join("css/vendor/reset.css"), "*{}").unwrap();

    let copied = driver.copy_file(&root, "/var/www", true).await.unwrap();

    assert_eq!(copied, 3);
    assert_eq!(server.file("/var/www/index.html").unwrap(), b"<html>");
    assert_eq!(server.file("/var/www/css/main.css").unwrap(), b"body{}");
    assert_eq!(server.file("/var/www/css/vendor/reset.css").unwrap(), b"*{}");
}

#[tokio::test]
async fn recursive_get_mirrors_the_tree() {
    let server = MockServer::new()
        .accept_password("pw")
        .with_dir("/logs")
        .with_dir("/logs/old")
        .with_file("/logs/app.log", "line 1\n")
        .with_file("/logs/old/app.log.1", "line 0\n")
        .with_file("/logs/old/app.log.2", "");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("logs");

    let copied = driver.copy_remote_file("/logs", &target, true).await.unwrap();

    assert_eq!(copied, 3);
    assert_eq!(std::fs::read(target.join("app.log")).unwrap(), b"line 1\n");
    assert_eq!(std::fs::read(target.join("old/app.log.1")).unwrap(), b"line 0\n");
    assert!(std::fs::read(target.join("old/app.log.2")).unwrap().is_empty());
    let mut top: Vec<String> = std::fs::read_dir(&target)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    top.sort();
    assert_eq!(top, vec!["app.log", "old"]);
}

#[tokio::test]
async fn directories_need_recurse() {
    let server = MockServer::new().accept_password("pw").with_dir("/etc");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let err = driver.copy_file(dir.path(), "/tmp/x", false).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidArgument { .. }));

    let err = driver
        .copy_remote_file("/etc", dir.path().join("etc"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidArgument { .. }));
}

#[tokio::test]
async fn missing_remote_source_is_an_sftp_error() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let err = driver
        .copy_remote_file("/nope", dir.path().join("nope"), false)
        .await
        .unwrap_err();
    match err {
        DriverError::SftpIo {
            host, path, reason, ..
        } => {
            assert_eq!(host, "files");
            assert_eq!(path, "/nope");
            assert!(reason.contains("does not exist"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_local_source_is_an_io_error() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let err = driver
        .copy_file(dir.path().join("absent"), "/tmp/absent", false)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Io(_)));
}

#[tokio::test]
async fn open_failure_is_a_handle_error() {
    let server = MockServer::new().accept_password("pw").with_dir("/target");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("f");
    std::fs::write(&local, "x").unwrap();

    // the destination is an existing directory, so the file cannot be created
    let err = driver.copy_file(&local, "/target", false).await.unwrap_err();
    assert!(matches!(err, DriverError::SftpHandle { ref path, .. } if path == "/target"));
}

#[tokio::test]
async fn mkdir_failure_keeps_engine_code() {
    let server = MockServer::new().accept_password("pw").with_file("/a", "plain file");
    let mut driver = connect(&server).await;

    let err = driver.mkdir("/a/b").await.unwrap_err();
    assert!(matches!(err, DriverError::SftpIo { ref path, .. } if path == "/a/b"));
    assert_eq!(err.engine_code(), Some(mock::engine::NO_SUCH_FILE));
    assert_eq!(server.mkdir_calls(), vec!["/a/b"]);
}

#[tokio::test]
async fn dropping_an_open_handle_warns() {
    let server = MockServer::new().accept_password("pw").with_file("/f", "x");
    let mut driver = connect(&server).await;
    let warnings = Warnings::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(warnings.clone()));

    let sftp = driver.sftp().await.unwrap();
    let closed = sftp.open("/f", flags::READ, 0).await.unwrap();
    closed.close().await.unwrap();
    assert!(warnings.0.lock().unwrap().is_empty());

    let open = sftp.open("/f", flags::READ, 0).await.unwrap();
    drop(open);
    assert_eq!(
        *warnings.0.lock().unwrap(),
        vec!["remote handle dropped while open"]
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn non_utf8_local_names_are_uploaded() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("in");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join(OsStr::from_bytes(b"caf\xe9.txt")), "latin").unwrap();

    let copied = driver.copy_file(&root, "/up", true).await.unwrap();

    assert_eq!(copied, 1);
    assert_eq!(server.file("/up/caf\u{fffd}.txt").unwrap(), b"latin");
}

#[cfg(unix)]
#[tokio::test]
async fn put_skips_local_directory_links() {
    let server = MockServer::new().accept_password("pw");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("tree");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("a.txt"), "a").unwrap();
    std::fs::write(root.join("sub/b.txt"), "b").unwrap();
    std::os::unix::fs::symlink(&root, root.join("sub/loop")).unwrap();
    std::os::unix::fs::symlink(root.join("a.txt"), root.join("sub/link.txt")).unwrap();

    let copied = driver.copy_file(&root, "/dst", true).await.unwrap();

    assert_eq!(copied, 3);
    assert_eq!(
        server.files(),
        vec!["/dst/a.txt", "/dst/sub/b.txt", "/dst/sub/link.txt"]
    );
    assert_eq!(server.file("/dst/sub/link.txt").unwrap(), b"a");
}

#[tokio::test]
async fn get_skips_remote_directory_links() {
    let server = MockServer::new()
        .accept_password("pw")
        .with_dir("/r")
        .with_file("/r/app.log", "log")
        .with_symlink("/r/current.log", "/r/app.log")
        .with_symlink("/r/loop", "/r");
    let mut driver = connect(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("r");

    let copied = driver.copy_remote_file("/r", &target, true).await.unwrap();

    assert_eq!(copied, 2);
    assert_eq!(std::fs::read(target.join("current.log")).unwrap(), b"log");
    assert!(!target.join("loop").exists());
}
