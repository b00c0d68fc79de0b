//! Device snapshot model.
//!
//! A [`SourceDevice`] is one device as reported by the MDM platform at fetch
//! time. Raw wire values are normalized on the way in so that the rest of the
//! pipeline (fingerprinting, GLPI mapping) only ever sees canonical values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Ios,
    Android,
    Windows,
    Macos,
    #[default]
    Unknown,
}

impl OsFamily {
    /// Map a free-form platform string (`"iPadOS"`, `"Android 14"`, `"Darwin"`)
    /// onto a family.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() {
            OsFamily::Unknown
        } else if lower.contains("ios") || lower.contains("iphone") || lower.contains("ipad") {
            OsFamily::Ios
        } else if lower.contains("android") {
            OsFamily::Android
        } else if lower.contains("windows") {
            OsFamily::Windows
        } else if lower.contains("mac") || lower.contains("darwin") {
            OsFamily::Macos
        } else {
            OsFamily::Unknown
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Ios => "ios",
            OsFamily::Android => "android",
            OsFamily::Windows => "windows",
            OsFamily::Macos => "macos",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a device in the MDM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Lost,
    Wiped,
    Pending,
    #[default]
    Unknown,
}

impl DeviceStatus {
    /// Map the vendor's status vocabulary onto the canonical lifecycle states.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "active" | "enrolled" | "managed" => DeviceStatus::Active,
            "inactive" | "unmanaged" | "retired" => DeviceStatus::Inactive,
            "lost" | "missing" => DeviceStatus::Lost,
            "wiped" | "erased" => DeviceStatus::Wiped,
            "pending" | "enrolling" => DeviceStatus::Pending,
            _ => DeviceStatus::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Lost => "lost",
            DeviceStatus::Wiped => "wiped",
            DeviceStatus::Pending => "pending",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One device as fetched from the MDM source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDevice {
    /// Stable MDM identifier. Never empty.
    pub external_id: String,
    /// Display name. Never empty.
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub imei: Option<String>,
    pub wifi_mac: Option<String>,
    pub os_family: OsFamily,
    pub os_version: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub status: DeviceStatus,
    pub is_supervised: bool,
    pub is_lost_mode: bool,
    /// Battery percentage, 0..=100.
    pub battery_level: Option<u8>,
    /// Total storage in MB.
    pub storage_total_mb: Option<u64>,
    /// Available storage in MB.
    pub storage_available_mb: Option<u64>,
    pub phone_number: Option<String>,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl SourceDevice {
    /// Create a device with the two mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidData`] when either value is blank.
    pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> ConnectorResult<Self> {
        let external_id = external_id.into().trim().to_string();
        let name = name.into().trim().to_string();

        if external_id.is_empty() {
            return Err(ConnectorError::invalid_data("device external id is required"));
        }
        if name.is_empty() {
            return Err(ConnectorError::invalid_data(format!(
                "device {external_id} has no name"
            )));
        }

        Ok(Self {
            external_id,
            name,
            model: String::new(),
            manufacturer: String::new(),
            serial_number: String::new(),
            imei: None,
            wifi_mac: None,
            os_family: OsFamily::Unknown,
            os_version: String::new(),
            user_email: None,
            user_name: None,
            status: DeviceStatus::Unknown,
            is_supervised: false,
            is_lost_mode: false,
            battery_level: None,
            storage_total_mb: None,
            storage_available_mb: None,
            phone_number: None,
            enrolled_at: None,
            last_seen_at: None,
        })
    }

    #[must_use]
    pub fn with_hardware(
        mut self,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        self.manufacturer = manufacturer.into().trim().to_string();
        self.model = model.into().trim().to_string();
        self.serial_number = serial_number.into().trim().to_string();
        self
    }

    #[must_use]
    pub fn with_imei(mut self, imei: Option<String>) -> Self {
        self.imei = non_blank(imei);
        self
    }

    #[must_use]
    pub fn with_wifi_mac(mut self, mac: Option<String>) -> Self {
        self.wifi_mac = non_blank(mac);
        self
    }

    /// Set the OS from the raw platform string and version.
    #[must_use]
    pub fn with_os(mut self, platform: &str, version: impl Into<String>) -> Self {
        self.os_family = OsFamily::normalize(platform);
        self.os_version = version.into().trim().to_string();
        self
    }

    #[must_use]
    pub fn with_user(mut self, email: Option<String>, name: Option<String>) -> Self {
        self.user_email = non_blank(email);
        self.user_name = non_blank(name);
        self
    }

    /// Set the lifecycle status from the vendor's raw status string.
    #[must_use]
    pub fn with_status(mut self, raw: &str) -> Self {
        self.status = DeviceStatus::normalize(raw);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, supervised: bool, lost_mode: bool) -> Self {
        self.is_supervised = supervised;
        self.is_lost_mode = lost_mode;
        self
    }

    /// Set the battery level; readings outside 0..=100 are discarded.
    #[must_use]
    pub fn with_battery(mut self, level: Option<i64>) -> Self {
        self.battery_level = level
            .filter(|l| (0..=100).contains(l))
            .and_then(|l| u8::try_from(l).ok());
        self
    }

    #[must_use]
    pub fn with_storage(mut self, total_mb: Option<u64>, available_mb: Option<u64>) -> Self {
        self.storage_total_mb = total_mb;
        self.storage_available_mb = available_mb;
        self
    }

    #[must_use]
    pub fn with_phone_number(mut self, phone: Option<String>) -> Self {
        self.phone_number = non_blank(phone);
        self
    }

    #[must_use]
    pub fn with_timestamps(
        mut self,
        enrolled_at: Option<DateTime<Utc>>,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.enrolled_at = enrolled_at;
        self.last_seen_at = last_seen_at;
        self
    }

    /// Phones and tablets.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        matches!(self.os_family, OsFamily::Ios | OsFamily::Android)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }

    /// Used storage in MB, when both readings are present and consistent.
    #[must_use]
    pub fn storage_used_mb(&self) -> Option<u64> {
        match (self.storage_total_mb, self.storage_available_mb) {
            (Some(total), Some(available)) => total.checked_sub(available),
            _ => None,
        }
    }

    /// Used storage as a percentage rounded to two decimals.
    #[must_use]
    pub fn storage_used_percent(&self) -> Option<f64> {
        let total = self.storage_total_mb.filter(|t| *t > 0)?;
        let used = self.storage_used_mb()?;
        let percent = used as f64 / total as f64 * 100.0;
        Some((percent * 100.0).round() / 100.0)
    }

    /// Best hardware identifier: IMEI for mobiles, then serial, then the MDM id.
    #[must_use]
    pub fn unique_identifier(&self) -> &str {
        if self.is_mobile() {
            if let Some(imei) = &self.imei {
                return imei;
            }
        }
        if self.serial_number.is_empty() {
            &self.external_id
        } else {
            &self.serial_number
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
