//! Status Codes and Error Records
//!
//! Native registry primitives report Win32-style return codes
//! ([`NativeStatus`]). The engines lift those codes, together with their
//! own failures, into [`RegError`] and classify every error by
//! [`ErrorCategory`]:
//!
//! | Failure                               | Category            |
//! |---------------------------------------|---------------------|
//! | Unknown hive alias, empty subkey path | InvalidArgument     |
//! | Key, value or file missing            | ObjectNotFound      |
//! | Access or privilege denied            | PermissionDenied    |
//! | Released handle, deleted key          | ResourceUnavailable |
//! | Value cannot take the requested kind  | InvalidType         |
//! | Any other native code                 | NotSpecified        |
//!
//! Per-item failures reach the caller as an [`ErrorRecord`] that names the
//! activity which failed and the item it failed on. They never stop the
//! sibling items of a batch.

use core::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::path::RootStore;
use crate::value::ValueKind;

/// Win32-style return code of a native registry primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NativeStatus(pub i32);

impl NativeStatus {
    pub const SUCCESS: Self = Self(0);
    pub const FILE_NOT_FOUND: Self = Self(2);
    pub const PATH_NOT_FOUND: Self = Self(3);
    pub const ACCESS_DENIED: Self = Self(5);
    pub const INVALID_HANDLE: Self = Self(6);
    pub const BAD_NETPATH: Self = Self(53);
    pub const INVALID_PARAMETER: Self = Self(87);
    pub const ALREADY_EXISTS: Self = Self(183);
    pub const NO_MORE_ITEMS: Self = Self(259);
    pub const KEY_DELETED: Self = Self(1018);
    pub const CHILD_MUST_BE_VOLATILE: Self = Self(1021);
    pub const PRIVILEGE_NOT_HELD: Self = Self(1314);

    /// Raw code
    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Wrap a primitive's return code, treating zero as success
    pub fn check(code: i32) -> Result<(), Self> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self(code))
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self.0 {
            2 | 3 => ErrorCategory::ObjectNotFound,
            5 | 1314 => ErrorCategory::PermissionDenied,
            6 | 1018 => ErrorCategory::ResourceUnavailable,
            87 => ErrorCategory::InvalidArgument,
            _ => ErrorCategory::NotSpecified,
        }
    }

    /// Short description for well-known codes
    pub const fn message(self) -> &'static str {
        match self.0 {
            0 => "The operation completed successfully",
            2 => "The system cannot find the file specified",
            3 => "The system cannot find the path specified",
            5 => "Access is denied",
            6 => "The handle is invalid",
            53 => "The network path was not found",
            87 => "The parameter is incorrect",
            183 => "Cannot create a file when that file already exists",
            259 => "No more data is available",
            1018 => "Illegal operation attempted on a registry key that has been marked for deletion",
            1021 => "Cannot create a stable subkey under a volatile parent key",
            1314 => "A required privilege is not held by the client",
            _ => "Unknown native error",
        }
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.0)
    }
}

/// Classification of a failure, used by callers to decide how to render it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    InvalidArgument,
    ObjectNotFound,
    PermissionDenied,
    ResourceUnavailable,
    InvalidType,
    InvalidOperation,
    OperationStopped,
    NotSpecified,
}

/// Errors produced by the registry engines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegError {
    #[error(
        "invalid path \"{path}\": registry paths should start with the registry hive, \
         followed by a subkey path such as: HKLM:\\Path"
    )]
    InvalidPath { path: String },

    #[error("the subkey path is empty; this command cannot {action} registry hives such as {store}")]
    EmptySubkeyPath {
        store: RootStore,
        action: &'static str,
    },

    #[error("\"{target}\" does not exist")]
    NotFound { target: String },

    #[error("cannot convert the value of \"{name}\" to {kind}: {reason}")]
    Coercion {
        name: String,
        kind: ValueKind,
        reason: String,
    },

    #[error("unable to determine the host of source key \"{key}\"; refusing to skip deletion")]
    UnknownSourceHost { key: String },

    #[error("cannot move \"{key}\" to \"{dest}\": the destination overlaps the source")]
    OverlappingMove { key: String, dest: String },

    #[error("{0}")]
    Native(NativeStatus),

    #[error("the operation was stopped")]
    Stopped,
}

impl RegError {
    /// Lift a native status, turning "file not found" into a not-found error for `target`
    pub fn from_status(status: NativeStatus, target: impl Into<String>) -> Self {
        if status == NativeStatus::FILE_NOT_FOUND {
            Self::NotFound {
                target: target.into(),
            }
        } else {
            Self::Native(status)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPath { .. }
            | Self::EmptySubkeyPath { .. }
            | Self::OverlappingMove { .. } => ErrorCategory::InvalidArgument,
            Self::NotFound { .. } => ErrorCategory::ObjectNotFound,
            Self::Coercion { .. } => ErrorCategory::InvalidType,
            Self::UnknownSourceHost { .. } => ErrorCategory::InvalidOperation,
            Self::Native(status) => status.category(),
            Self::Stopped => ErrorCategory::OperationStopped,
        }
    }

    /// Native code carried by this error, if any
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::Native(status) => Some(status.0),
            _ => None,
        }
    }
}

impl From<NativeStatus> for RegError {
    fn from(status: NativeStatus) -> Self {
        Self::Native(status)
    }
}

/// Activity identifiers carried by error records
pub mod error_ids {
    pub const INVALID_PATH: &str = "InvalidPath";
    pub const UNABLE_TO_OPEN_BASE_KEY: &str = "UnableToOpenBaseKey";
    pub const UNABLE_TO_OPEN_SUB_KEY: &str = "UnableToOpenSubKey";
    pub const UNABLE_TO_GET_SUB_KEY_NAMES: &str = "UnableToGetSubKeyNames";
    pub const UNABLE_TO_GET_PROPERTIES: &str = "UnableToGetProperties";
    pub const UNABLE_TO_GET_KEY_NAME: &str = "UnableToGetKeyName";
    pub const UNABLE_TO_COPY_KEY: &str = "UnableToCopyKey";
    pub const DESTINATION_OVERLAPS_SOURCE: &str = "DestinationOverlapsSource";
    pub const UNABLE_TO_DELETE_KEY: &str = "UnableToDeleteKey";
    pub const UNABLE_TO_DELETE_SOURCE_KEY: &str = "UnableToDeleteSourceKey";
    pub const UNABLE_TO_CREATE_KEY: &str = "UnableToCreateKey";
    pub const UNABLE_TO_RENAME_KEY: &str = "UnableToRenameKey";
    pub const EMPTY_SUB_KEY_PATH: &str = "EmptySubKeyPath";
    pub const UNABLE_TO_CONVERT_VALUE: &str = "UnableToConvertValue";
    pub const UNABLE_TO_SET_VALUE: &str = "UnableToSetValue";
    pub const UNABLE_TO_REMOVE_VALUE: &str = "UnableToRemoveValue";
    pub const UNABLE_TO_MOUNT_HIVE: &str = "UnableToMountHive";
    pub const UNABLE_TO_DISMOUNT_KEY: &str = "UnableToDismountKey";
    pub const UNABLE_TO_ADJUST_PRIVILEGE: &str = "UnableToAdjustPrivilege";
    pub const OPERATION_STOPPED: &str = "OperationStopped";
}

/// A per-item failure reported alongside successful results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Activity that failed (see [`error_ids`])
    pub id: &'static str,
    /// Item the activity failed on: a path, host, key or property name
    pub target: String,
    pub error: RegError,
}

impl ErrorRecord {
    pub fn new(id: &'static str, target: impl Into<String>, error: impl Into<RegError>) -> Self {
        Self {
            id,
            target: target.into(),
            error: error.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.id, self.target, self.error)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_categories() {
        assert_eq!(NativeStatus::FILE_NOT_FOUND.category(), ErrorCategory::ObjectNotFound);
        assert_eq!(NativeStatus::ACCESS_DENIED.category(), ErrorCategory::PermissionDenied);
        assert_eq!(NativeStatus::PRIVILEGE_NOT_HELD.category(), ErrorCategory::PermissionDenied);
        assert_eq!(NativeStatus::INVALID_HANDLE.category(), ErrorCategory::ResourceUnavailable);
        assert_eq!(NativeStatus::INVALID_PARAMETER.category(), ErrorCategory::InvalidArgument);
        assert_eq!(NativeStatus(1450).category(), ErrorCategory::NotSpecified);
    }

    #[test]
    fn test_check_wraps_nonzero_codes() {
        assert_eq!(NativeStatus::check(0), Ok(()));
        let err = RegError::from(NativeStatus::check(1450).unwrap_err());
        assert_eq!(err.native_code(), Some(1450));
    }

    #[test]
    fn test_from_status_not_found() {
        let err = RegError::from_status(NativeStatus::FILE_NOT_FOUND, "Software\\Missing");
        assert_eq!(err.category(), ErrorCategory::ObjectNotFound);
        assert!(err.to_string().contains("Software\\Missing"));

        let err = RegError::from_status(NativeStatus::ACCESS_DENIED, "Software");
        assert_eq!(err, RegError::Native(NativeStatus::ACCESS_DENIED));
    }

    #[test]
    fn test_record_display() {
        let record = ErrorRecord::new(
            error_ids::INVALID_PATH,
            "BOGUS:\\X",
            RegError::InvalidPath { path: "BOGUS:\\X".into() },
        );
        assert_eq!(record.category(), ErrorCategory::InvalidArgument);
        assert!(record.to_string().starts_with("InvalidPath (BOGUS:\\X)"));
    }
}
