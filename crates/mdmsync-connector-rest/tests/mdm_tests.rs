//! Integration tests for the MDM connector using wiremock.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mdmsync_connector::error::ConnectorError;
use mdmsync_connector::traits::SourceConnector;
use mdmsync_connector_rest::{MdmConfig, MdmConnector, RetryConfig};

const API_KEY: &str = "0123456789abcdef";
const DEVICES: &str = "/api/v1/mdm/devices";

// =============================================================================
// Test Helpers
// =============================================================================

async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

fn create_config(base_url: &str) -> MdmConfig {
    MdmConfig::new(base_url, API_KEY).with_retry(RetryConfig::disabled())
}

fn device_json(id: &str, name: &str) -> serde_json::Value {
    json!({
        "device_id": id,
        "device_name": name,
        "platform_type": "iOS",
        "os_version": "17.1",
        "serial_number": format!("SN-{id}"),
        "device_status": "managed"
    })
}

// =============================================================================
// Connection Tests
// =============================================================================

#[tokio::test]
async fn test_connection_sends_oauth_header() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(header("Authorization", format!("Zoho-oauthtoken {API_KEY}").as_str()))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [], "total": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let result = connector.test_connection().await;
    assert!(result.is_ok(), "Connection should succeed: {:?}", result.err());
}

#[tokio::test]
async fn test_connection_rejected_credentials() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "invalid token" })))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let err = connector.test_connection().await.unwrap_err();
    assert!(matches!(err, ConnectorError::AuthenticationFailed));
}

// =============================================================================
// Listing Tests
// =============================================================================

#[tokio::test]
async fn test_list_devices_passes_pagination_and_since() {
    let server = setup_mock_server().await;
    let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "4"))
        .and(query_param("modified_since", "2024-05-01T12:00:00+00:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [device_json("a", "Alpha"), device_json("b", "Beta")],
            "total": 6
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let page = connector.list_devices(Some(since), 2, 4).await.unwrap();
    let devices = &page.devices;

    assert_eq!(page.fetched, 2);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].external_id, "a");
    assert_eq!(devices[1].serial_number, "SN-b");
}

#[tokio::test]
async fn test_list_devices_skips_malformed_entries() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                device_json("a", "Alpha"),
                { "device_name": "no id" },
                device_json("c", "Gamma")
            ],
            "total": 3
        })))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let page = connector.list_devices(None, 10, 0).await.unwrap();

    let ids: Vec<&str> = page.devices.iter().map(|d| d.external_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(page.fetched, 3);
    assert_eq!(page.skipped(), 1);
}

#[tokio::test]
async fn test_page_of_only_malformed_entries_is_not_the_end() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "device_name": "no id" }, { "device_name": "no id 2" }],
            "total": 3
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [device_json("c", "Gamma")],
            "total": 3
        })))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();

    let first = connector.list_devices(None, 2, 0).await.unwrap();
    assert!(first.devices.is_empty());
    assert!(!first.is_end());
    assert_eq!(first.fetched, 2);

    let second = connector.list_devices(None, 2, first.fetched).await.unwrap();
    assert_eq!(second.devices.len(), 1);
    assert_eq!(second.devices[0].external_id, "c");
}

#[tokio::test]
async fn test_custom_devices_path() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/mdm/v2/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [], "total": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_config(&server.uri()).with_devices_path("mdm/v2/devices/");
    let connector = MdmConnector::new(config).unwrap();
    assert!(connector.list_devices(None, 10, 0).await.unwrap().is_end());
}

#[tokio::test]
async fn test_count_devices_reads_total() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [device_json("a", "Alpha")],
            "total": 250
        })))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    assert_eq!(connector.count_devices(None).await.unwrap(), 250);
}

// =============================================================================
// Single Device Tests
// =============================================================================

#[tokio::test]
async fn test_get_device_found() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(format!("{DEVICES}/dev-1")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "device": device_json("dev-1", "One") })),
        )
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let device = connector.get_device("dev-1").await.unwrap().unwrap();
    assert_eq!(device.name, "One");
}

#[tokio::test]
async fn test_get_device_not_found_is_none() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(format!("{DEVICES}/ghost")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    assert!(connector.get_device("ghost").await.unwrap().is_none());
}

// =============================================================================
// Retry & Error Mapping Tests
// =============================================================================

#[tokio::test]
async fn test_retries_transient_status_then_succeeds() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [device_json("a", "Alpha")],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = MdmConfig::new(server.uri(), API_KEY).with_retry(
        RetryConfig::new(3).with_delays(10, 50).without_jitter(),
    );
    let connector = MdmConnector::new(config).unwrap();

    let page = connector.list_devices(None, 10, 0).await.unwrap();
    assert_eq!(page.devices.len(), 1);
}

#[tokio::test]
async fn test_rate_limited_after_retries_exhausted() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let err = connector.list_devices(None, 10, 0).await.unwrap_err();

    assert!(matches!(
        err,
        ConnectorError::RateLimited {
            retry_after_secs: Some(7)
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_operation_failure() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "database down" })))
        .mount(&server)
        .await;

    let connector = MdmConnector::new(create_config(&server.uri())).unwrap();
    let err = connector.list_devices(None, 10, 0).await.unwrap_err();

    assert!(matches!(err, ConnectorError::OperationFailed { .. }));
    assert!(err.to_string().contains("database down"));
}

#[tokio::test]
async fn test_timeout_maps_to_connection_timeout() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path(DEVICES))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "devices": [], "total": 0 }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = create_config(&server.uri()).with_timeout(1);
    let connector = MdmConnector::new(config).unwrap();
    let err = connector.list_devices(None, 10, 0).await.unwrap_err();

    assert!(matches!(err, ConnectorError::ConnectionTimeout { timeout_secs: 1 }));
}
