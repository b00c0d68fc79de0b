//! # Connector Framework
//!
//! Core abstractions for the two remote systems a device reconciliation talks to:
//! the MDM platform (source of truth) and the GLPI asset inventory (target).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   SourceDevice   ┌──────────────────────┐   upsert   ┌──────────────────┐
//! │ SourceConnector  │ ───────────────▶ │ reconciliation core  │ ─────────▶ │ TargetConnector  │
//! │ (MDM)            │                  │ (mdmsync-sync)       │            │ (GLPI)           │
//! └──────────────────┘                  └──────────────────────┘            └──────────────────┘
//!                                               │ acquire()
//!                                               ▼
//!                                       AdaptiveRateLimiter
//! ```
//!
//! ## Crate Organization
//!
//! - [`device`] - Normalized device snapshot model
//! - [`traits`] - Source and target connector traits
//! - [`error`] - Error types with transient/permanent classification
//! - [`rate_limit`] - Sliding-window, adaptive and burst rate limiters

pub mod device;
pub mod error;
pub mod rate_limit;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::device::{DeviceStatus, OsFamily, SourceDevice};
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::rate_limit::{AdaptiveRateLimiter, BurstRateLimiter, RateLimiter};
    pub use crate::traits::{DevicePage, SourceConnector, TargetConnector, TargetId};
}

pub use device::{DeviceStatus, OsFamily, SourceDevice};
pub use error::{ConnectorError, ConnectorResult, ErrorKind};
pub use rate_limit::{AdaptiveRateLimiter, BurstRateLimiter, BurstUsage, RateLimiter};
pub use traits::{DevicePage, SourceConnector, TargetConnector, TargetId};

// Re-export async_trait for implementors
pub use async_trait::async_trait;
