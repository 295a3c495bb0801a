//! # ApplicationGateway Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};

/// Status of the ApplicationGateway resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationGatewayStatus {
    /// False whenever the last reconciliation failed
    #[serde(default)]
    pub ready: bool,
    /// Replica count of the live Deployment
    #[serde(default)]
    pub replicas: Option<i32>,
    /// Config version currently rolled out
    #[serde(default)]
    pub version: Option<String>,
    /// Name of the generated ConfigMap holding the merged document
    #[serde(default)]
    pub config_map_name: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
