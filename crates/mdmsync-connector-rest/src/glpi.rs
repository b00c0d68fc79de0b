//! GLPI asset inventory target connector.
//!
//! Devices are stored as GLPI `Computer` items. The item comment carries a
//! marker with the MDM id so a device can be found again when the local
//! mapping is lost.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use mdmsync_connector::device::{OsFamily, SourceDevice};
use mdmsync_connector::error::{ConnectorError, ConnectorResult};
use mdmsync_connector::traits::{TargetConnector, TargetId};

use crate::client::{HttpClient, HttpSettings};
use crate::config::GlpiConfig;

/// First line of every comment written by the sync.
pub const SYNC_MARKER: &str = "Synced from MDM";

// GLPI search option ids.
const FIELD_NAME: &str = "1";
const FIELD_ID: &str = "2";
const FIELD_SERIAL: &str = "5";
const FIELD_USER_EMAIL: &str = "5";
const FIELD_COMMENT: &str = "16";

const COMPUTER: &str = "Computer";

/// Comment line identifying the MDM device behind a GLPI item.
#[must_use]
pub fn mdm_id_marker(external_id: &str) -> String {
    format!("MDM ID: [{external_id}]")
}

/// Dropdown tables referenced from a `Computer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupTable {
    Manufacturer,
    ComputerModel,
    ComputerType,
    OperatingSystem,
    State,
    User,
}

impl LookupTable {
    #[must_use]
    pub fn itemtype(self) -> &'static str {
        match self {
            LookupTable::Manufacturer => "Manufacturer",
            LookupTable::ComputerModel => "ComputerModel",
            LookupTable::ComputerType => "ComputerType",
            LookupTable::OperatingSystem => "OperatingSystem",
            LookupTable::State => "State",
            LookupTable::User => "User",
        }
    }

    /// Foreign key column on `Computer`.
    #[must_use]
    pub fn foreign_key(self) -> &'static str {
        match self {
            LookupTable::Manufacturer => "manufacturers_id",
            LookupTable::ComputerModel => "computermodels_id",
            LookupTable::ComputerType => "computertypes_id",
            LookupTable::OperatingSystem => "operatingsystems_id",
            LookupTable::State => "states_id",
            LookupTable::User => "users_id",
        }
    }

    fn search_field(self) -> &'static str {
        match self {
            LookupTable::User => FIELD_USER_EMAIL,
            _ => FIELD_NAME,
        }
    }

    /// Users are never created by the sync.
    fn creatable(self) -> bool {
        !matches!(self, LookupTable::User)
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    totalcount: u64,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: Option<Value>,
}

/// Writes devices into GLPI through its REST API.
pub struct GlpiConnector {
    config: GlpiConfig,
    display_name: String,
    http: HttpClient,
    session: RwLock<Option<String>>,
    lookups: RwLock<HashMap<(LookupTable, String), i64>>,
}

impl std::fmt::Debug for GlpiConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlpiConnector")
            .field("config", &self.config)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl GlpiConnector {
    /// Create a connector from a validated configuration. No session is
    /// opened until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when validation fails.
    pub fn new(config: GlpiConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::new(
            "GLPI",
            &config.base_url,
            headers,
            HttpSettings {
                timeout_secs: config.timeout_secs,
                verify_ssl: config.verify_ssl,
                rate_limit_per_minute: config.rate_limit_per_minute,
                retry: config.retry.clone(),
            },
        )?;

        Ok(Self {
            display_name: format!("GLPI ({})", config.base_url),
            config,
            http,
            session: RwLock::new(None),
            lookups: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GlpiConfig {
        &self.config
    }

    /// Whether a session token is currently held.
    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Forget every resolved dropdown id.
    pub async fn clear_lookup_cache(&self) {
        self.lookups.write().await.clear();
    }

    /// Number of GLPI computers carrying the sync marker.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    #[instrument(skip(self))]
    pub async fn synced_device_count(&self) -> ConnectorResult<u64> {
        let response = self
            .search(COMPUTER, FIELD_COMMENT, "contains", SYNC_MARKER)
            .await?;
        Ok(response.totalcount)
    }

    /// Open a new session and cache its token.
    async fn authenticate(&self) -> ConnectorResult<String> {
        let url = self.http.endpoint(["initSession"])?;
        let request = self
            .http
            .request(Method::GET, url)
            .header("App-Token", self.config.app_token.as_str())
            .header(
                header::AUTHORIZATION,
                format!("user_token {}", self.config.user_token),
            );

        let response: SessionResponse = match self.http.send_json(request).await {
            Ok(response) => response,
            Err(e) if e.is_transient() || e.is_not_found() => return Err(e),
            Err(e) => {
                warn!(error = %e, "GLPI rejected session credentials");
                return Err(ConnectorError::AuthenticationFailed);
            }
        };

        let token = response
            .session_token
            .filter(|t| !t.is_empty())
            .ok_or(ConnectorError::AuthenticationFailed)?;

        *self.session.write().await = Some(token.clone());
        info!(base_url = %self.config.base_url, "GLPI session opened");
        Ok(token)
    }

    async fn session_token(&self) -> ConnectorResult<String> {
        if let Some(token) = self.session.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    /// Authenticated call. A rejected session is renewed once and replayed.
    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ConnectorResult<Value> {
        let url = self.http.endpoint(segments)?;
        let mut renewed = false;

        loop {
            let token = self.session_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header("App-Token", self.config.app_token.as_str())
                .header("Session-Token", token.as_str());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match self.http.send_json::<Value>(request).await {
                Err(ConnectorError::AuthenticationFailed) if !renewed => {
                    warn!(path = %url.path(), "GLPI session rejected, re-authenticating");
                    *self.session.write().await = None;
                    renewed = true;
                }
                other => return other,
            }
        }
    }

    async fn search(
        &self,
        itemtype: &str,
        field: &str,
        searchtype: &str,
        value: &str,
    ) -> ConnectorResult<SearchResponse> {
        let query = vec![
            ("criteria[0][field]".to_string(), field.to_string()),
            ("criteria[0][searchtype]".to_string(), searchtype.to_string()),
            ("criteria[0][value]".to_string(), value.to_string()),
            ("forcedisplay[0]".to_string(), FIELD_ID.to_string()),
            ("range".to_string(), "0-0".to_string()),
        ];

        let raw = self
            .call(Method::GET, &["search", itemtype], &query, None)
            .await?;
        serde_json::from_value(raw).map_err(|e| {
            ConnectorError::invalid_data(format!("unexpected GLPI search response: {e}"))
        })
    }

    async fn search_first(
        &self,
        itemtype: &str,
        field: &str,
        searchtype: &str,
        value: &str,
    ) -> ConnectorResult<Option<i64>> {
        let response = self.search(itemtype, field, searchtype, value).await?;
        Ok(response
            .data
            .first()
            .and_then(|row| row.get(FIELD_ID))
            .and_then(id_from_value))
    }

    async fn create_item(&self, itemtype: &str, input: Value) -> ConnectorResult<i64> {
        let body = json!({ "input": input });
        let raw = self.call(Method::POST, &[itemtype], &[], Some(&body)).await?;
        let response: CreateResponse = serde_json::from_value(raw).map_err(|e| {
            ConnectorError::invalid_data(format!("unexpected GLPI create response: {e}"))
        })?;

        response.id.as_ref().and_then(id_from_value).ok_or_else(|| {
            ConnectorError::invalid_data(format!("GLPI did not return an id for new {itemtype}"))
        })
    }

    /// Resolve a dropdown id by name, creating the entry when allowed.
    /// Failures are logged and yield `None`.
    async fn resolve(&self, table: LookupTable, name: &str) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let key = (table, name.to_lowercase());
        if let Some(id) = self.lookups.read().await.get(&key) {
            return Some(*id);
        }

        let resolved = match self
            .search_first(table.itemtype(), table.search_field(), "equals", name)
            .await
        {
            Ok(Some(id)) => Ok(Some(id)),
            Ok(None) if table.creatable() => self
                .create_item(table.itemtype(), json!({ "name": name }))
                .await
                .map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match resolved {
            Ok(Some(id)) => {
                debug!(itemtype = table.itemtype(), name = %name, id = id, "Resolved GLPI lookup");
                self.lookups.write().await.insert(key, id);
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(itemtype = table.itemtype(), name = %name, error = %e, "Failed to resolve GLPI lookup");
                None
            }
        }
    }

    /// Build the `Computer` input for a device.
    async fn build_input(&self, device: &SourceDevice) -> Value {
        let mut input = Map::new();
        input.insert("name".into(), json!(device.name));
        input.insert("serial".into(), json!(device.serial_number));
        input.insert(
            "otherserial".into(),
            json!(device
                .imei
                .as_deref()
                .or(device.wifi_mac.as_deref())
                .unwrap_or_default()),
        );
        input.insert("comment".into(), json!(build_comment(device)));
        if let Some(email) = &device.user_email {
            input.insert("contact".into(), json!(email));
        }

        let device_type = if device.is_mobile() { "Mobile Device" } else { "Computer" };
        let state = if device.is_active() { "Active" } else { "Inactive" };

        let references = [
            (LookupTable::Manufacturer, Some(device.manufacturer.as_str())),
            (LookupTable::ComputerModel, Some(device.model.as_str())),
            (LookupTable::ComputerType, Some(device_type)),
            (LookupTable::OperatingSystem, os_name(device.os_family)),
            (LookupTable::State, Some(state)),
            (LookupTable::User, device.user_email.as_deref()),
        ];

        for (table, name) in references {
            let Some(name) = name else { continue };
            if let Some(id) = self.resolve(table, name).await {
                input.insert(table.foreign_key().into(), json!(id));
            }
        }

        Value::Object(input)
    }

    async fn find_existing(&self, device: &SourceDevice) -> ConnectorResult<Option<TargetId>> {
        let marker = mdm_id_marker(&device.external_id);
        if let Some(id) = self
            .search_first(COMPUTER, FIELD_COMMENT, "contains", &marker)
            .await?
        {
            debug!(device_id = %device.external_id, glpi_id = id, "Matched GLPI computer by MDM marker");
            return Ok(Some(id));
        }

        if device.serial_number.is_empty() {
            return Ok(None);
        }
        let found = self
            .search_first(COMPUTER, FIELD_SERIAL, "equals", &device.serial_number)
            .await?;
        if let Some(id) = found {
            debug!(device_id = %device.external_id, glpi_id = id, "Matched GLPI computer by serial");
        }
        Ok(found)
    }

    async fn update_computer(&self, id: TargetId, input: &Value) -> ConnectorResult<()> {
        let id_segment = id.to_string();
        let body = json!({ "input": input });
        let raw = self
            .call(Method::PUT, &[COMPUTER, id_segment.as_str()], &[], Some(&body))
            .await?;

        // GLPI reports per-item results as `[{"<id>": bool, "message": ..}]`.
        let updated = raw
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get(&id_segment))
            .and_then(Value::as_bool);
        if updated == Some(false) {
            return Err(ConnectorError::not_found(format!("{COMPUTER}/{id}")));
        }
        Ok(())
    }
}

fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn os_name(family: OsFamily) -> Option<&'static str> {
    match family {
        OsFamily::Ios => Some("iOS"),
        OsFamily::Android => Some("Android"),
        OsFamily::Windows => Some("Windows"),
        OsFamily::Macos => Some("macOS"),
        OsFamily::Unknown => None,
    }
}

/// Human-readable comment stored on the GLPI item.
#[must_use]
pub fn build_comment(device: &SourceDevice) -> String {
    let mut lines = vec![
        SYNC_MARKER.to_string(),
        mdm_id_marker(&device.external_id),
        format!("OS: {} {}", device.os_family, device.os_version)
            .trim_end()
            .to_string(),
    ];
    if let Some(email) = &device.user_email {
        lines.push(format!("User: {email}"));
    }
    if let Some(battery) = device.battery_level {
        lines.push(format!("Battery: {battery}%"));
    }
    if let Some(used) = device.storage_used_percent() {
        lines.push(format!("Storage used: {used}%"));
    }
    if let Some(phone) = &device.phone_number {
        lines.push(format!("Phone: {phone}"));
    }
    lines.join("\n")
}

#[async_trait]
impl TargetConnector for GlpiConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.call(Method::GET, &["getMyProfiles"], &[], None).await?;
        info!(base_url = %self.config.base_url, "GLPI connection test successful");
        Ok(())
    }

    #[instrument(skip(self, device), fields(device_id = %device.external_id))]
    async fn upsert_device(
        &self,
        known_id: Option<TargetId>,
        device: &SourceDevice,
    ) -> ConnectorResult<TargetId> {
        let input = self.build_input(device).await;

        if let Some(id) = known_id {
            match self.update_computer(id, &input).await {
                Ok(()) => {
                    debug!(glpi_id = id, "Updated GLPI computer");
                    return Ok(id);
                }
                Err(e) if e.is_not_found() => {
                    warn!(glpi_id = id, "GLPI computer no longer exists, recreating");
                }
                Err(e) => return Err(e),
            }
        } else if let Some(id) = self.find_existing(device).await? {
            self.update_computer(id, &input).await?;
            debug!(glpi_id = id, "Updated matched GLPI computer");
            return Ok(id);
        }

        let id = self.create_item(COMPUTER, input).await?;
        info!(glpi_id = id, "Created GLPI computer");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn close(&self) -> ConnectorResult<()> {
        let Some(token) = self.session.write().await.take() else {
            return Ok(());
        };

        let url = self.http.endpoint(["killSession"])?;
        let request = self
            .http
            .request(Method::GET, url)
            .header("App-Token", self.config.app_token.as_str())
            .header("Session-Token", token.as_str());
        self.http.send(request).await?;
        info!("GLPI session closed");
        Ok(())
    }
}
