//! Error handling tests.
//!
//! Tests for the error types, error creation helpers, and error introspection.

use std::io;
use std::time::Duration;

use ssh_driver::{DriverError, EngineError, EngineErrorKind};

// =============================================================================
// EngineError
// =============================================================================

#[test]
fn engine_error_kinds() {
    assert_eq!(EngineError::session(-18, "denied").kind, EngineErrorKind::Session);
    assert_eq!(EngineError::sftp(2, "no such file").kind, EngineErrorKind::Sftp);

    let io_err = io::Error::from_raw_os_error(32);
    let err = EngineError::io(&io_err);
    assert_eq!(err.kind, EngineErrorKind::Io);
    assert_eq!(err.code, 32);
}

#[test]
fn engine_error_display() {
    let err = EngineError::session(-13, "socket disconnect");
    assert_eq!(err.to_string(), "session error -13: socket disconnect");
}

// =============================================================================
// DriverError creation and introspection
// =============================================================================

#[test]
fn authentication_error_creation() {
    let err = DriverError::authentication("h", 22, "root", "no authentication methods succeeded");
    assert!(err.is_authentication());
    assert!(!err.is_timeout());
    assert_eq!(err.engine_code(), None);
    assert!(err.to_string().contains("'root'"));
}

#[test]
fn channel_error_carries_code() {
    let err = DriverError::channel("h", "exec", EngineError::session(-22, "request denied"));
    assert_eq!(err.engine_code(), Some(-22));
    assert!(err.to_string().contains("channel exec failed on host h"));
}

#[test]
fn sftp_handle_error_reports_errno() {
    let err = DriverError::sftp_handle("h", "/etc/shadow", EngineError::sftp(3, "permission denied"));
    assert_eq!(err.engine_code(), Some(3));
    assert!(err.to_string().contains("error no: 3"));
}

#[test]
fn sftp_io_error_keeps_engine_code() {
    let err = DriverError::sftp_engine(
        "h",
        "/tmp/x",
        "error writing to remote file",
        EngineError::sftp(4, "failure"),
    );
    assert_eq!(err.engine_code(), Some(4));
    assert!(err.to_string().contains("/tmp/x"));
    assert!(err.to_string().contains("failure"));
    let source = std::error::Error::source(&err).and_then(|s| s.downcast_ref::<EngineError>());
    assert_eq!(source.map(|s| s.code), Some(4));
}

#[test]
fn local_sftp_io_error_has_no_code() {
    let err = DriverError::sftp_io("h", "/tmp/x", "remote file does not exist");
    assert_eq!(err.engine_code(), None);
    assert!(std::error::Error::source(&err).is_none());
}

#[test]
fn timeout_error_creation() {
    let err = DriverError::Timeout {
        host: "h".into(),
        duration: Duration::from_secs(5),
    };
    assert!(err.is_timeout());
    assert!(!err.is_authentication());
}

#[test]
fn io_error_conversion() {
    let err: DriverError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
    assert!(matches!(err, DriverError::Io(_)));
}
