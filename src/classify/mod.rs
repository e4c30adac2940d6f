//! Error classification.
//!
//! Raw [`BackendFailure`](crate::core::BackendFailure)s are mapped into a
//! closed taxonomy with a retryability flag before any policy looks at them.

mod category;
mod classified;
mod classifier;

pub use category::ErrorCategory;
pub use classified::ClassifiedError;
pub use classifier::ErrorClassifier;
