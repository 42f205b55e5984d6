use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// The decoding core itself never writes to stdout or stderr; everything
/// goes through the `log` facade so embedders can route diagnostics.
pub fn init_logger() {
    env_logger::init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}

/// Logs a payload as a hex dump at debug level, with a context prefix
/// such as "(TPL) decrypting".
pub fn log_payload(prefix: &str, data: &[u8]) {
    if log_enabled!(Level::Debug) {
        debug!("{prefix} {}", hex::encode(data));
    }
}
