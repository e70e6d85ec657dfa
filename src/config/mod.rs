//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → TrackerConfig / SubscriberConfig (validated, immutable)
//!     → handed to subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_subscriber_config, ConfigError};
pub use schema::{
    ChainConfig, ObservabilityConfig, PollerConfig, ReconnectConfig, ReconstructionConfig,
    RelayConfig, SubscriberConfig, TrackerConfig,
};
