//! Connector traits
//!
//! The reconciliation engine only ever talks to the two remote systems
//! through these traits, so tests can swap in mocks and deployments can
//! swap vendors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::device::SourceDevice;
use crate::error::ConnectorResult;

/// Identifier of a device record in the target asset system.
pub type TargetId = i64;

/// One page of a source listing.
///
/// `fetched` counts the entries the remote side returned, including those
/// that could not be parsed into `devices`. Paging advances by `fetched`.
#[derive(Debug, Clone, Default)]
pub struct DevicePage {
    pub devices: Vec<SourceDevice>,
    pub fetched: u32,
}

impl DevicePage {
    /// A page where every remote entry parsed.
    #[must_use]
    pub fn complete(devices: Vec<SourceDevice>) -> Self {
        let fetched = u32::try_from(devices.len()).unwrap_or(u32::MAX);
        Self { devices, fetched }
    }

    /// The remote side returned nothing; the listing is exhausted.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.fetched == 0
    }

    /// Entries dropped because they did not parse.
    #[must_use]
    pub fn skipped(&self) -> u32 {
        self.fetched
            .saturating_sub(u32::try_from(self.devices.len()).unwrap_or(u32::MAX))
    }
}

/// Read side: the MDM platform, authoritative for device existence and attributes.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Human-readable name used in logs and health reports.
    fn display_name(&self) -> &str;

    /// Verify the source is reachable and the credentials are accepted.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Fetch a single device. `Ok(None)` when the source does not know the id.
    async fn get_device(&self, external_id: &str) -> ConnectorResult<Option<SourceDevice>>;

    /// Fetch one page of devices, optionally only those modified since `since`.
    ///
    /// A page with no remote entries signals the end of the listing. A page
    /// whose entries all failed to parse is not the end.
    async fn list_devices(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
        offset: u32,
    ) -> ConnectorResult<DevicePage>;

    /// Count devices, optionally only those modified since `since`.
    async fn count_devices(&self, since: Option<DateTime<Utc>>) -> ConnectorResult<u64>;
}

/// Write side: the asset-management system receiving device records.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    /// Human-readable name used in logs and health reports.
    fn display_name(&self) -> &str;

    /// Verify the target is reachable and the credentials are accepted.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Create the device when `known_id` is `None`, else update that record.
    ///
    /// Lookup-table references (manufacturer, model, OS, state, user) are
    /// resolved by name inside the connector and must be idempotent.
    async fn upsert_device(
        &self,
        known_id: Option<TargetId>,
        device: &SourceDevice,
    ) -> ConnectorResult<TargetId>;

    /// Release remote sessions. The default does nothing.
    async fn close(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_with_only_unparseable_entries_is_not_the_end() {
        let page = DevicePage {
            devices: Vec::new(),
            fetched: 2,
        };
        assert!(!page.is_end());
        assert_eq!(page.skipped(), 2);
        assert!(DevicePage::default().is_end());
    }

    #[test]
    fn test_complete_page_counts_its_devices() {
        let page = DevicePage::complete(vec![SourceDevice::new("dev-1", "Pixel").unwrap()]);
        assert_eq!(page.fetched, 1);
        assert_eq!(page.skipped(), 0);
    }
}
