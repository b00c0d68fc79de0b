//! ManageEngine MDM source connector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use mdmsync_connector::device::SourceDevice;
use mdmsync_connector::error::{ConnectorError, ConnectorResult};
use mdmsync_connector::traits::{DevicePage, SourceConnector};

use crate::client::{HttpClient, HttpSettings};
use crate::config::MdmConfig;

/// Reads mobile devices from the MDM REST API.
#[derive(Debug)]
pub struct MdmConnector {
    config: MdmConfig,
    display_name: String,
    http: HttpClient,
    devices_path: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    #[serde(default)]
    devices: Vec<Value>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    #[serde(default)]
    device: Option<Value>,
}

/// Device record as the MDM API returns it.
#[derive(Debug, Deserialize)]
struct MdmDeviceRecord {
    #[serde(deserialize_with = "string_or_number")]
    device_id: String,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    platform_type: Option<String>,
    #[serde(default)]
    os_version: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    imei: Option<String>,
    #[serde(default)]
    wifi_mac: Option<String>,
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    device_status: Option<String>,
    #[serde(default)]
    is_supervised: bool,
    #[serde(default)]
    is_lost_mode: bool,
    #[serde(default)]
    battery_level: Option<f64>,
    #[serde(default)]
    total_capacity: Option<f64>,
    #[serde(default)]
    available_capacity: Option<f64>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    enrollment_date: Option<String>,
    #[serde(default)]
    last_seen: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl MdmConnector {
    /// Create a connector from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when validation fails.
    pub fn new(config: MdmConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Zoho-oauthtoken {}", config.api_key))
            .map_err(|_| ConnectorError::InvalidConfiguration {
                message: "MDM api_key contains invalid header characters".to_string(),
            })?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::new(
            "MDM",
            &config.base_url,
            headers,
            HttpSettings {
                timeout_secs: config.timeout_secs,
                verify_ssl: config.verify_ssl,
                rate_limit_per_minute: config.rate_limit_per_minute,
                retry: config.retry.clone(),
            },
        )?;

        let devices_path = config
            .devices_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            display_name: format!("MDM ({})", config.base_url),
            config,
            http,
            devices_path,
        })
    }

    pub fn config(&self) -> &MdmConfig {
        &self.config
    }

    /// Parse one device entry from an API payload.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidData`] when the id is missing or the
    /// device has neither a name nor an id to fall back on.
    pub fn parse_device(value: Value) -> ConnectorResult<SourceDevice> {
        let record: MdmDeviceRecord = serde_json::from_value(value)
            .map_err(|e| ConnectorError::invalid_data(format!("malformed MDM device: {e}")))?;

        let name = record
            .device_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| record.device_id.clone());

        let device = SourceDevice::new(record.device_id.clone(), name)?
            .with_hardware(
                record.manufacturer.unwrap_or_default(),
                record.model.unwrap_or_default(),
                record.serial_number.unwrap_or_default(),
            )
            .with_imei(record.imei)
            .with_wifi_mac(record.wifi_mac)
            .with_os(
                record.platform_type.as_deref().unwrap_or_default(),
                record.os_version.unwrap_or_default(),
            )
            .with_user(record.user_email, record.user_name)
            .with_status(record.device_status.as_deref().unwrap_or("unknown"))
            .with_flags(record.is_supervised, record.is_lost_mode)
            .with_battery(record.battery_level.map(|b| b.round() as i64))
            .with_storage(
                to_megabytes(record.total_capacity),
                to_megabytes(record.available_capacity),
            )
            .with_phone_number(record.phone_number)
            .with_timestamps(
                parse_timestamp(record.enrollment_date.as_deref()),
                parse_timestamp(record.last_seen.as_deref()),
            );

        Ok(device)
    }

    async fn fetch_page(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
        offset: u32,
    ) -> ConnectorResult<DeviceListResponse> {
        let url = self.http.endpoint(&self.devices_path)?;
        let mut query = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(since) = since {
            query.push(("modified_since", since.to_rfc3339()));
        }

        self.http
            .send_json(self.http.request(Method::GET, url).query(&query))
            .await
    }
}

fn to_megabytes(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64)
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Epoch milliseconds are also seen in the wild.
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

#[async_trait]
impl SourceConnector for MdmConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.fetch_page(None, 1, 0).await?;
        info!(base_url = %self.config.base_url, "MDM connection test successful");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_device(&self, external_id: &str) -> ConnectorResult<Option<SourceDevice>> {
        let mut segments = self.devices_path.clone();
        segments.push(external_id.to_string());
        let url = self.http.endpoint(&segments)?;

        let response: DeviceResponse = match self
            .http
            .send_json(self.http.request(Method::GET, url))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(device_id = %external_id, "Device not found in MDM");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        response.device.map(Self::parse_device).transpose()
    }

    #[instrument(skip(self))]
    async fn list_devices(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
        offset: u32,
    ) -> ConnectorResult<DevicePage> {
        let page = self.fetch_page(since, limit, offset).await?;
        let fetched = u32::try_from(page.devices.len()).unwrap_or(u32::MAX);

        let mut devices = Vec::with_capacity(page.devices.len());
        for raw in page.devices {
            let raw_id = raw.get("device_id").cloned();
            match Self::parse_device(raw) {
                Ok(device) => devices.push(device),
                Err(e) => warn!(device_id = ?raw_id, error = %e, "Skipping unparseable MDM device"),
            }
        }

        debug!(
            fetched,
            parsed = devices.len(),
            total = ?page.total,
            offset = offset,
            "Fetched MDM device page"
        );
        Ok(DevicePage { devices, fetched })
    }

    #[instrument(skip(self))]
    async fn count_devices(&self, since: Option<DateTime<Utc>>) -> ConnectorResult<u64> {
        let page = self.fetch_page(since, 1, 0).await?;
        Ok(page.total.unwrap_or(page.devices.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use mdmsync_connector::device::{DeviceStatus, OsFamily};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_full_device() {
        let device = MdmConnector::parse_device(json!({
            "device_id": "dev-1",
            "device_name": "Sales iPhone",
            "model": "iPhone 14",
            "manufacturer": "Apple",
            "platform_type": "iOS",
            "os_version": "17.2",
            "serial_number": "F2LX1234",
            "imei": "356789012345678",
            "user_email": "Ana@Example.com",
            "user_name": "Ana",
            "device_status": "managed",
            "is_supervised": true,
            "battery_level": 87,
            "total_capacity": 128000,
            "available_capacity": 64000,
            "enrollment_date": "2024-01-10T08:00:00Z",
            "last_seen": "1717171717000"
        }))
        .unwrap();

        assert_eq!(device.external_id, "dev-1");
        assert_eq!(device.name, "Sales iPhone");
        assert_eq!(device.os_family, OsFamily::Ios);
        assert_eq!(device.battery_level, Some(87));
        assert_eq!(device.storage_used_mb(), Some(64000));
        assert!(device.is_supervised);
        assert!(device.enrolled_at.is_some());
        assert!(device.last_seen_at.is_some());
        assert_ne!(device.status, DeviceStatus::Unknown);
    }

    #[test]
    fn test_parse_numeric_id_and_missing_name() {
        let device = MdmConnector::parse_device(json!({ "device_id": 9001 })).unwrap();
        assert_eq!(device.external_id, "9001");
        assert_eq!(device.name, "9001");
        assert_eq!(device.status, DeviceStatus::Unknown);
    }

    #[test]
    fn test_parse_rejects_missing_id() {
        let err = MdmConnector::parse_device(json!({ "device_name": "orphan" })).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidData { .. }));
    }

    #[test]
    fn test_parse_drops_invalid_telemetry() {
        let device = MdmConnector::parse_device(json!({
            "device_id": "d",
            "battery_level": 140,
            "total_capacity": -5
        }))
        .unwrap();
        assert_eq!(device.battery_level, None);
        assert_eq!(device.storage_total_mb, None);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = MdmConfig::new("not a url", "0123456789abcdef");
        assert!(MdmConnector::new(config).is_err());
    }
}
