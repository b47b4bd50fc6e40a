use std::fmt::Display;

use crate::utils::Log;

/// Unwrap a result at the CLI boundary, logging the error and exiting on failure
pub fn unwrap_or_exit<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            Log::error(&error, None);
            std::process::exit(1);
        }
    }
}
