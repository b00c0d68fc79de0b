//! Change fingerprint of a device snapshot.
//!
//! A device whose fingerprint matches the one stored after its last
//! successful sync is skipped without any target call.

use std::fmt;

use mdmsync_connector::SourceDevice;
use sha2::{Digest, Sha256};

/// Stands in for a missing optional value. Never produced by a present
/// value because every field is length-prefixed.
const NONE_SENTINEL: &str = "~";

/// Hex-encoded SHA-256 digest of the tracked device fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `stored` was produced from the same tracked fields.
    #[must_use]
    pub fn matches(&self, stored: Option<&str>) -> bool {
        stored == Some(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

struct Canonical(Vec<u8>);

impl Canonical {
    fn field(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(raw) => {
                let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                self.0
                    .extend_from_slice(format!("{}:{normalized};", normalized.len()).as_bytes());
            }
            None => self.0.extend_from_slice(NONE_SENTINEL.as_bytes()),
        }
        self
    }

    fn number(&mut self, value: Option<u64>) -> &mut Self {
        let text = value.map(|v| v.to_string());
        self.field(text.as_deref())
    }

    fn flag(&mut self, value: bool) -> &mut Self {
        self.field(Some(if value { "1" } else { "0" }))
    }
}

/// Compute the fingerprint of `device`.
///
/// The external id is the record key and is not part of the digest.
#[must_use]
pub fn fingerprint(device: &SourceDevice) -> Fingerprint {
    // Identifiers compare case-insensitively.
    let email = device.user_email.as_deref().map(str::to_lowercase);
    let serial = device.serial_number.to_lowercase();

    let mut canonical = Canonical(Vec::with_capacity(256));
    canonical
        .field(Some(&device.name))
        .field(Some(&device.model))
        .field(Some(&device.manufacturer))
        .field(Some(&serial))
        .field(Some(device.os_family.as_str()))
        .field(Some(&device.os_version))
        .field(email.as_deref())
        .field(device.user_name.as_deref())
        .field(Some(device.status.as_str()))
        .flag(device.is_supervised)
        .flag(device.is_lost_mode)
        .number(device.battery_level.map(u64::from))
        .number(device.storage_total_mb)
        .number(device.storage_available_mb)
        .field(device.phone_number.as_deref());

    Fingerprint(hex::encode(Sha256::digest(&canonical.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn device() -> SourceDevice {
        SourceDevice::new("dev-1", "iPhone de Marie")
            .unwrap()
            .with_hardware("Apple", "iPhone 15", "F2LXK0AAHG7F")
            .with_os("ios", "17.4")
            .with_user(
                Some("marie@example.com".to_string()),
                Some("Marie Curie".to_string()),
            )
            .with_status("active")
            .with_flags(true, false)
            .with_battery(Some(80))
            .with_storage(Some(128_000), Some(64_000))
            .with_phone_number(Some("+33600000000".to_string()))
    }

    #[test]
    fn test_stable() {
        let d = device();
        assert_eq!(fingerprint(&d), fingerprint(&d));
        assert_eq!(fingerprint(&d), fingerprint(&d.clone()));
        assert_eq!(fingerprint(&d).as_str().len(), 64);
    }

    #[test]
    fn test_sensitive_to_tracked_fields() {
        let base = fingerprint(&device());

        let mut changed = device();
        changed.name = "iPhone pro".to_string();
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_os("ios", "17.5");
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_user(Some("pierre@example.com".to_string()), None);
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_flags(true, true);
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_battery(Some(79));
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_storage(Some(128_000), Some(63_999));
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_phone_number(None);
        assert_ne!(fingerprint(&changed), base);

        let changed = device().with_status("retired");
        assert_ne!(fingerprint(&changed), base);
    }

    #[test]
    fn test_ignores_untracked_fields() {
        let base = fingerprint(&device());

        let mut other = device();
        other.external_id = "dev-2".to_string();
        other.imei = Some("356938035643809".to_string());
        other.last_seen_at = Some(Utc::now());
        assert_eq!(fingerprint(&other), base);
    }

    #[test]
    fn test_email_case_and_whitespace_do_not_matter() {
        let base = fingerprint(&device());

        let mut other = device();
        other.user_email = Some("Marie@Example.COM".to_string());
        other.name = "iPhone  de   Marie ".to_string();
        assert_eq!(fingerprint(&other), base);

        let mut other = device();
        other.serial_number = "f2lxk0aahg7f".to_string();
        assert_eq!(fingerprint(&other), base);

        let mut other = device();
        other.serial_number = " F2LXK0AAHG7F ".to_string();
        assert_eq!(fingerprint(&other), base);

        let mut other = device();
        other.serial_number = "F2LXK0AAHG7G".to_string();
        assert_ne!(fingerprint(&other), base);
    }

    #[test]
    fn test_none_differs_from_empty_and_adjacent_fields_do_not_merge() {
        let mut a = device();
        a.user_name = None;
        let mut b = device();
        b.user_name = Some(String::new());
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let mut c = device();
        c.model = "iPhone 15A".to_string();
        c.manufacturer = "pple".to_string();
        let mut d = device();
        d.model = "iPhone 15".to_string();
        d.manufacturer = "Apple".to_string();
        assert_ne!(fingerprint(&c), fingerprint(&d));
    }

    #[test]
    fn test_matches() {
        let fp = fingerprint(&device());
        assert!(fp.matches(Some(fp.as_str())));
        assert!(!fp.matches(None));
        assert!(!fp.matches(Some("deadbeef")));
    }
}
