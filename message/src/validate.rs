//! Structural checks on raw bytes, for deciding between dropping and parsing before
//! committing to a typed decode.

use crate::{
    air,
    dispatcher,
    CommandCode,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum Severity {
    None,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Validation {
    pub severity: Severity,
    pub message:  String,
}

impl Validation {
    #[inline]
    pub fn clean() -> Self {
        Self {
            severity: Severity::None,
            message:  String::new(),
        }
    }

    #[inline]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message:  message.into(),
        }
    }

    #[inline]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message:  message.into(),
        }
    }

    /// Only errors cause a frame to be rejected.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.severity != Severity::Error
    }
}

/// Validate bytes as a dispatcher frame. Unrecognized command codes are a warning.
pub fn validate(src: &[u8]) -> Validation {
    match dispatcher::check_structure(src) {
        Err(e) => Validation::error(e.to_string()),
        Ok(header) => {
            let command = CommandCode::from_raw(header.command);

            if command.is_known() {
                Validation::clean()
            } else {
                Validation::warning(format!("unrecognized command code 0x{:04x}", command.raw()))
            }
        },
    }
}

/// Validate bytes as a DMR air-interface packet.
pub fn validate_air(src: &[u8]) -> Validation {
    match air::check_structure(src) {
        Ok(_) => Validation::clean(),
        Err(e) => Validation::error(e.to_string()),
    }
}
