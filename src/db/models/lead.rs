use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::agent::AgentId;

/// Successful lead as normalized by the CRM boundary.
///
/// Numeric fields are already coerced by the time a `Lead` exists; nothing downstream re-parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub user_id: AgentId,
    pub commission: Decimal,
    pub campaign: Option<String>,
    pub sms_count: u32,
}
