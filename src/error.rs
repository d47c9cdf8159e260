// src/error.rs

use thiserror::Error;

/// Błędy biblioteki FloodGuard.
///
/// Odmowa z braku opa albo wstrzymanie kary (immunitet, uprawnienia, trusted)
/// to NIE są błędy – to zwykłe werdykty bramki (`gate::Verdict`).
#[derive(Debug, Error)]
pub enum FloodError {
    /// Brak stanu kanału u transportu (np. event dla kanału, którego nie śledzimy).
    #[error("no channel state for {0}")]
    UnknownChannel(String),

    #[error("invalid hostmask: {0:?}")]
    InvalidHostmask(String),

    /// Nieparsowalne wejście z zewnątrz (linia feedu, tryb, znacznik czasu).
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("tokio scheduler needs a running runtime")]
    NoRuntime,
}
