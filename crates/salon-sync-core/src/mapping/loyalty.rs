//! Loyalty account mapping.

use super::{non_empty, now_rfc3339, Amount, ExternalId, MappingError, Patch};
use crate::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LoyaltySource {
    id: Option<ExternalId>,
    contact_id: Option<String>,
    points: Option<Points>,
    last_activity_date: Patch<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Points {
    balance: Patch<Amount>,
    redeemed: Patch<Amount>,
    earned: Patch<Amount>,
}

fn points_column(points: Option<&Points>, pick: impl FnOnce(&Points) -> &Patch<Amount>) -> Patch<i64> {
    points
        .map(|p| pick(p).clone())
        .unwrap_or_default()
        .filter_map(|a| a.to_f64())
        .map(|n| n.round() as i64)
}

/// Row for the `loyalty` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoyaltyRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wix_loyalty_account_id: Option<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub points_balance: Patch<i64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub redeemed_points: Patch<i64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub earned_points: Patch<i64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub last_activity: Patch<String>,
    pub raw_payload: Value,
    pub updated_at: String,
}

/// Map a sanitized loyalty account entity.
///
/// Rows are keyed on the Wix contact, not the loyalty account.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has an unexpected JSON type.
pub fn map_loyalty(entity: &Value) -> Result<LoyaltyRow, MappingError> {
    let source: LoyaltySource = serde_json::from_value(entity.clone())
        .map_err(|e| MappingError::shape(&EntityType::Loyalty, e))?;
    let points = source.points.as_ref();

    Ok(LoyaltyRow {
        contact_id: source.contact_id.as_deref().and_then(non_empty),
        wix_loyalty_account_id: source.id.as_ref().and_then(ExternalId::to_text),
        points_balance: points_column(points, |p| &p.balance),
        redeemed_points: points_column(points, |p| &p.redeemed),
        earned_points: points_column(points, |p| &p.earned),
        last_activity: source.last_activity_date.clone(),
        raw_payload: entity.clone(),
        updated_at: now_rfc3339(),
    })
}

#[cfg(test)]
#[path = "loyalty_tests.rs"]
mod tests;
