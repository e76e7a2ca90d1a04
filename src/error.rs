// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel error type
//!
//! A single error enum is used across the scheduler, thread manager,
//! synchronization objects, and timer subsystem. Every fallible entry
//! point returns `Result<T>` built on this type rather than a raw
//! status code.

#![allow(dead_code)]

/// Result type for kernel operations.
pub type Result<T = ()> = core::result::Result<T, Error>;

/// Raw status code, kept for callers at the syscall boundary that want
/// a flat integer rather than an enum.
pub type Status = i32;

/// Kernel error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InvalidParameter = -1,
    InvalidObjectType = -2,
    InvalidDeviceState = -3,
    NotInitialized = -4,
    AlreadyInitialized = -5,
    InsufficientResources = -6,
    NoMoreEntries = -7,
    NotFound = -8,
    Timeout = -9,
    Cancelled = -10,
    AccessDenied = -11,
    BadState = -12,
    Internal = -13,
}

impl Error {
    /// Convert the error to a raw status code.
    pub fn to_status(self) -> Status {
        self as Status
    }

    /// Convert a raw status code back to an error.
    ///
    /// Unrecognized codes map to `Internal`.
    pub fn from_status(status: Status) -> Self {
        match status {
            -1 => Error::InvalidParameter,
            -2 => Error::InvalidObjectType,
            -3 => Error::InvalidDeviceState,
            -4 => Error::NotInitialized,
            -5 => Error::AlreadyInitialized,
            -6 => Error::InsufficientResources,
            -7 => Error::NoMoreEntries,
            -8 => Error::NotFound,
            -9 => Error::Timeout,
            -10 => Error::Cancelled,
            -11 => Error::AccessDenied,
            -12 => Error::BadState,
            _ => Error::Internal,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::from_status(status)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        err.to_status()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Error::InvalidParameter => "invalid parameter",
            Error::InvalidObjectType => "invalid object type",
            Error::InvalidDeviceState => "invalid device state",
            Error::NotInitialized => "not initialized",
            Error::AlreadyInitialized => "already initialized",
            Error::InsufficientResources => "insufficient resources",
            Error::NoMoreEntries => "no more entries",
            Error::NotFound => "not found",
            Error::Timeout => "timed out",
            Error::Cancelled => "cancelled",
            Error::AccessDenied => "access denied",
            Error::BadState => "bad state",
            Error::Internal => "internal error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for e in [
            Error::InvalidParameter,
            Error::InvalidObjectType,
            Error::NotFound,
            Error::Timeout,
            Error::Cancelled,
            Error::Internal,
        ] {
            assert_eq!(Error::from_status(e.to_status()), e);
        }
    }

    #[test]
    fn unknown_status_is_internal() {
        assert_eq!(Error::from_status(-999), Error::Internal);
    }
}
