//! Failure classification for transfer attempts
//!
//! Splits every attempt outcome into success, transient (worth retrying
//! with backoff), or permanent (retrying is futile). HTTP statuses classify
//! by range; transport errors classify by the reqwest error predicates,
//! defaulting to transient.

use reqwest::StatusCode;

use crate::errors::TransferError;

/// Classification of a single attempt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Success,
    Transient,
    Permanent,
}

/// Classify an HTTP status code
pub fn classify_status(status: StatusCode) -> ErrorClass {
    if status.is_success() {
        ErrorClass::Success
    } else if status.is_client_error() {
        ErrorClass::Permanent
    } else {
        // 5xx, and anything unexpected (1xx/3xx leaking through redirect
        // handling), is worth another attempt.
        ErrorClass::Transient
    }
}

/// Build the transfer error for a non-success HTTP status
pub(crate) fn status_error(status: StatusCode, url: &str) -> TransferError {
    let reason = format!("HTTP {} for {}", status.as_u16(), url);
    match classify_status(status) {
        ErrorClass::Permanent => TransferError::HttpPermanent { reason },
        _ => TransferError::HttpTransient { reason },
    }
}

/// Classify a transport-layer error
pub fn classify_transport(error: &reqwest::Error) -> ErrorClass {
    // Malformed URLs and unsupported schemes surface as builder errors;
    // TLS failures are buried in the error source chain because reqwest
    // does not expose them as a distinct kind.
    if error.is_builder() || is_tls_failure(error) {
        ErrorClass::Permanent
    } else {
        // Timeouts, connect failures, DNS errors, resets, and truncated
        // bodies all land here, as does anything unrecognized.
        ErrorClass::Transient
    }
}

/// Build the transfer error for a transport failure
pub(crate) fn transport_error(error: &reqwest::Error, url: &str) -> TransferError {
    let reason = format!("{} ({})", error, url);
    match classify_transport(error) {
        ErrorClass::Permanent => TransferError::HttpPermanent { reason },
        _ => TransferError::HttpTransient { reason },
    }
}

fn is_tls_failure(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        let text = current.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        source = current.source();
    }
    false
}
