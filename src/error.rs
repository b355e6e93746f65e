//! Allocator-level error types.
//!
//! There is exactly one fallible *operation* in the public surface:
//! [`crate::Allocator::init`]. `malloc`/`free`/`realloc` report failure as
//! `None`/no-op per spec, matching the classic C allocator contract rather
//! than threading a `Result` through every call.

use std::fmt;

/// Why [`crate::Allocator::init`] failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
  /// The heap provider refused either the initial bootstrap request or the
  /// first chunk extension.
  ProviderExhausted,
}

impl fmt::Display for InitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InitError::ProviderExhausted => {
        write!(f, "heap provider could not satisfy the initial heap allocation")
      }
    }
  }
}

impl std::error::Error for InitError {}
