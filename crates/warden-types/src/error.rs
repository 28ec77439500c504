//! Error codes and the identifier error shared by every warden crate.
//!
//! All warden error types implement [`ErrorCode`] so that callers (platform
//! adapters, debug tooling) can branch on a stable machine-readable code
//! instead of parsing display strings.

use thiserror::Error;

/// Machine-readable error interface.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**: e.g. `"CACHE_ILLEGAL_STATE"`
/// - **Domain prefix**: `SUBJECT_`, `STORE_`, `CACHE_`, `CONFIG_`
/// - **Stable**: codes are part of the public contract
///
/// # Example
///
/// ```
/// use warden_types::ErrorCode;
///
/// enum LookupError {
///     Missing,
///     Busy,
/// }
///
/// impl ErrorCode for LookupError {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::Missing => "LOOKUP_MISSING",
///             Self::Busy => "LOOKUP_BUSY",
///         }
///     }
///
///     fn is_recoverable(&self) -> bool {
///         matches!(self, Self::Busy)
///     }
/// }
///
/// assert_eq!(LookupError::Busy.code(), "LOOKUP_BUSY");
/// assert!(!LookupError::Missing.is_recoverable());
/// ```
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying (or a user-side correction) may succeed.
    ///
    /// Bad input never becomes valid on retry; a storage backend that was
    /// briefly unreachable may.
    fn is_recoverable(&self) -> bool;
}

/// A raw identifier string could not be turned into a subject identifier.
///
/// Raised by `SubjectType::parse_identifier` when deserialization fails or
/// when a fixed-entry subject type does not list the identifier. Always
/// carries the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier '{raw}' for subject type '{subject_type}'")]
pub struct InvalidIdentifier {
    /// Name of the subject type that rejected the identifier.
    pub subject_type: String,
    /// The unparsed input.
    pub raw: String,
}

impl InvalidIdentifier {
    /// Creates a new error for `raw` rejected by `subject_type`.
    pub fn new(subject_type: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            raw: raw.into(),
        }
    }
}

impl ErrorCode for InvalidIdentifier {
    fn code(&self) -> &'static str {
        "SUBJECT_INVALID_IDENTIFIER"
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Validates that an error code follows warden conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE. Intended for tests.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();
    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Validates every listed error with [`assert_error_code`].
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
