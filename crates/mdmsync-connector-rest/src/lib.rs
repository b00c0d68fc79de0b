//! # REST Connectors
//!
//! HTTP implementations of the connector traits:
//!
//! - [`MdmConnector`]: reads devices from the ManageEngine MDM API
//!   (`Zoho-oauthtoken` auth, offset pagination, `modified_since` filter)
//! - [`GlpiConnector`]: writes devices into GLPI as `Computer` items
//!   (session tokens, dropdown resolution, MDM id marker in the comment)
//!
//! Both share [`HttpClient`], which applies a per-connector rate limit, a
//! bounded retry loop with exponential backoff and uniform status mapping.
//!
//! ## Example
//!
//! ```ignore
//! use mdmsync_connector_rest::{MdmConfig, MdmConnector};
//!
//! let mdm = MdmConnector::new(MdmConfig::new("https://mdm.example.com", api_key))?;
//! let page = mdm.list_devices(None, 100, 0).await?;
//! ```

pub mod client;
pub mod config;
pub mod glpi;
pub mod mdm;
pub mod retry;

pub use client::{HttpClient, HttpSettings};
pub use config::{GlpiConfig, MdmConfig};
pub use glpi::{build_comment, mdm_id_marker, GlpiConnector, LookupTable, SYNC_MARKER};
pub use mdm::MdmConnector;
pub use retry::RetryConfig;
