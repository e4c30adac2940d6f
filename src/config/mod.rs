//! Configuration lookup and per-backend settings resolution.
//!
//! [`ConfigSource`] is the narrow key/value interface the rest of the crate
//! reads from. [`LayeredConfig`] implements it over a flattened TOML
//! document, and [`EffectiveSettings`] merges the global, per-backend and
//! per-tenant layers into the values one dispatch attempt runs with.

mod settings;
mod source;

pub use settings::{
    EffectiveSettings, SettingsOverlay, DEFAULT_COOL_DOWN, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_MAX_RETRIES, DEFAULT_RATE_LIMIT_BACKOFF, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT,
};
pub use source::{ConfigSource, LayeredConfig};
