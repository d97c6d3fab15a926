/*!
Tests for the error taxonomy and its user-facing messages.
*/

use crate::error::BrowserBytesError;
use std::io;

#[test]
fn test_error_display() {
    let error = BrowserBytesError::validation("Please enter your passphrase");
    assert_eq!(
        error.to_string(),
        "Validation error: Please enter your passphrase"
    );

    let error = BrowserBytesError::store("API Error: 404");
    assert_eq!(error.to_string(), "Record store error: API Error: 404");

    let error = BrowserBytesError::Timeout {
        operation: "set_cookie",
    };
    assert_eq!(error.to_string(), "Operation 'set_cookie' timed out");
}

#[test]
fn test_from_io_error() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    match BrowserBytesError::from(io_error) {
        BrowserBytesError::Io(_) => {}
        other => panic!("Expected Io error variant, got {other:?}"),
    }
}

#[test]
fn test_json_errors_are_format_errors() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    match BrowserBytesError::from(json_error) {
        BrowserBytesError::Format(_) => {}
        other => panic!("Expected Format error variant, got {other:?}"),
    }
}

#[test]
fn test_user_messages() {
    assert_eq!(
        BrowserBytesError::NotFound.user_message(),
        "No data found for this passphrase. Please check and try again."
    );
    assert_eq!(
        BrowserBytesError::format("expected value at line 1").user_message(),
        "Error importing data. Please check the format and try again."
    );
    assert_eq!(BrowserBytesError::Decryption.user_message(), "Decryption failed");

    let message = BrowserBytesError::generator("connection refused").user_message();
    assert!(message.contains("connection refused"));
}

#[test]
fn test_decryption_error_carries_no_detail() {
    assert_eq!(BrowserBytesError::Decryption.to_string(), "Decryption failed");
}

#[test]
fn test_error_is_send_and_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<BrowserBytesError>();
    assert_sync::<BrowserBytesError>();
}
