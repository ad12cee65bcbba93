//! Mattermost Listener - Main Library
//!
//! Thin application layer over the `mattersocket` event client.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config path, logging)
//! - **mattersocket**: Real-time event client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use mattermost_listener::bin_common::{init_tracing, load_config_from_env, ConfigType};
//! use mattermost_listener::mattersocket::EventClient;
//! ```

// Re-export workspace libraries for convenience
pub use mattersocket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, ConfigType};
    pub use logging::init_tracing;
}
