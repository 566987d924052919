use std::future::Future;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Value};

use crate::coordinator::{Coordinator, DAYS_AHEAD};
use crate::sensor::{all_sensors, LunchSensor};

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetDayParams {
    /// 0 = today, 1 = tomorrow, up to 6
    pub days_ahead: usize,
}

/// MCP front end for the lunch sensors.
///
/// Every session shares one [`Coordinator`], so all clients read the same snapshot and a
/// `refresh` from any of them joins a refresh already in flight.
#[derive(Clone)]
pub struct LunchMcpServer {
    coordinator: Arc<Coordinator>,
    sensors: Arc<Vec<LunchSensor>>,
    tool_router: ToolRouter<LunchMcpServer>,
}

fn to_text(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[tool_router]
impl LunchMcpServer {
    pub fn new(coordinator: Arc<Coordinator>, entry_id: &str) -> Self {
        Self {
            coordinator,
            sensors: Arc::new(all_sensors(entry_id)),
            tool_router: Self::tool_router(),
        }
    }

    /// All 14 sensor readings.
    pub fn sensors_json(&self) -> Value {
        let state = self.coordinator.state();
        let today = self.coordinator.today();
        let readings: Vec<_> = self
            .sensors
            .iter()
            .map(|sensor| sensor.read(&state, today))
            .collect();
        json!({ "sensors": readings })
    }

    /// Order and menu readings for one day.
    pub fn day_json(&self, days_ahead: usize) -> Result<Value, String> {
        if days_ahead >= DAYS_AHEAD {
            return Err(format!(
                "days_ahead must be between 0 and {}, got {}",
                DAYS_AHEAD - 1,
                days_ahead
            ));
        }
        let state = self.coordinator.state();
        let today = self.coordinator.today();
        let order = self.sensors[days_ahead * 2].read(&state, today);
        let menu = self.sensors[days_ahead * 2 + 1].read(&state, today);
        Ok(json!({ "order": order, "menu": menu }))
    }

    /// Coordinator health: phase, last success, last error.
    pub fn status_json(&self) -> Value {
        let state = self.coordinator.state();
        json!({
            "phase": state.phase,
            "available": state.is_available(),
            "last_success": state.last_success.map(|t| t.to_rfc3339()),
            "last_refresh_success": state.last_refresh_success,
            "last_error": state.last_error.as_ref().map(|e| json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })),
            "requires_reconfiguration": state.requires_reconfiguration,
            "snapshot_built_at": state.snapshot.as_ref().map(|s| s.built_at.to_rfc3339()),
            "venue": self.coordinator.venue(),
            "poll_interval_minutes": self.coordinator.interval().as_secs() / 60,
        })
    }

    /// Runs a manual refresh and reports the result.
    pub async fn refresh_json(&self) -> Result<Value, Value> {
        match self.coordinator.refresh().await {
            Ok(snapshot) => Ok(json!({
                "success": true,
                "built_at": snapshot.built_at.to_rfc3339(),
                "orders": snapshot.order_count(),
                "days": snapshot.days.len(),
            })),
            Err(e) => Err(json!({
                "success": false,
                "error": e.kind(),
                "details": e.to_string(),
            })),
        }
    }

    #[tool(description = "Get all lunch order and menu sensors for the next 7 days")]
    async fn get_sensors(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(to_text(
            &self.sensors_json(),
        ))]))
    }

    #[tool(description = "Get the lunch order and menu for one day (0 = today, up to 6)")]
    async fn get_day(
        &self,
        Parameters(params): Parameters<GetDayParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.day_json(params.days_ahead) {
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(to_text(&result))])),
            Err(message) => {
                let error = json!({ "error": "Invalid day", "details": message });
                Ok(CallToolResult::error(vec![Content::text(error.to_string())]))
            }
        }
    }

    #[tool(description = "Get refresh status: last successful update and last error")]
    async fn get_status(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(to_text(
            &self.status_json(),
        ))]))
    }

    #[tool(description = "Refresh orders and menus from Bessa now")]
    async fn refresh(&self) -> Result<CallToolResult, McpError> {
        match self.refresh_json().await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(to_text(&result))])),
            Err(error) => Ok(CallToolResult::error(vec![Content::text(error.to_string())])),
        }
    }
}

#[tool_handler]
impl ServerHandler for LunchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("This server exposes read-only Bessa lunch sensors: for each of the next 7 days, the user's order (meals, state, pickup code and time) and the canteen menu with remaining stock. Use get_sensors for everything, get_day for a single day, get_status to check data freshness, and refresh to poll Bessa immediately.".to_string()),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        Ok(self.get_info())
    }
}
