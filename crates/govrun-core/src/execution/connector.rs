//! Connector dispatch registry: the boundary between the
//! pending-action lifecycle and whatever external system actually performs
//! an action. Only `UpdateCardStatus` is handled locally; everything else
//! routes here.

use async_trait::async_trait;
use serde_json::Value;

/// The outcome of dispatching an action to a connector.
pub struct ConnectorResult {
    pub ok: bool,
    pub message: String,
    pub data: Value,
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, action_type: &str, payload: &Value) -> ConnectorResult;
}

/// Demo connector that simulates a write-back without any external
/// dependency: always succeeds.
pub struct MockConnector;

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, action_type: &str, payload: &Value) -> ConnectorResult {
        ConnectorResult {
            ok: true,
            message: format!("mock-executed {action_type}"),
            data: serde_json::json!({"action_type": action_type, "payload": payload}),
        }
    }
}

/// Unknown connector name: fails closed rather than silently no-op'ing.
pub struct FailClosedConnector {
    name: String,
}

impl FailClosedConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Connector for FailClosedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, action_type: &str, payload: &Value) -> ConnectorResult {
        ConnectorResult {
            ok: false,
            message: format!(
                "connector '{}' not implemented; set GOV_CONNECTOR=mock or implement a real connector",
                self.name
            ),
            data: serde_json::json!({"action_type": action_type, "payload": payload}),
        }
    }
}

/// Resolve the configured connector name to an implementation. Unknown
/// names fail closed rather than panicking or defaulting to `mock`.
pub fn get_connector(name: &str) -> Box<dyn Connector> {
    if name.eq_ignore_ascii_case("mock") {
        Box::new(MockConnector)
    } else {
        Box::new(FailClosedConnector::new(name))
    }
}
