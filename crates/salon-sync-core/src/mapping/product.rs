//! Product mapping for Wix Stores catalog items.

use super::{non_empty, now_rfc3339, Amount, ExternalId, MappingError, Patch};
use crate::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProductSource {
    id: Option<ExternalId>,
    name: Option<String>,
    sku: Patch<String>,
    price_data: Option<PriceData>,
    price: Option<ProductPrice>,
    currency: Option<String>,
    stock: Option<Stock>,
    visible: Patch<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PriceData {
    price: Option<Amount>,
    currency: Option<String>,
}

/// `price` is either a number or a `priceData`-like object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductPrice {
    Flat(Amount),
    Nested(PriceData),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Stock {
    quantity: Patch<Amount>,
    in_stock: Patch<bool>,
}

impl ProductSource {
    fn price_data(&self) -> Option<&PriceData> {
        self.price_data.as_ref().or(match &self.price {
            Some(ProductPrice::Nested(data)) => Some(data),
            _ => None,
        })
    }

    fn price(&self) -> Option<f64> {
        self.price_data()
            .and_then(|d| d.price.as_ref())
            .and_then(Amount::to_f64)
            .or_else(|| match &self.price {
                Some(ProductPrice::Flat(amount)) => amount.to_f64(),
                _ => None,
            })
    }

    fn currency(&self) -> Option<String> {
        self.price_data()
            .and_then(|d| d.currency.as_deref())
            .or(self.currency.as_deref())
            .and_then(non_empty)
    }
}

/// Row for the `products` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wix_product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub sku: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub price: Patch<f64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub currency: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub stock_quantity: Patch<i64>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub in_stock: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_missing")]
    pub visible: Patch<bool>,
    pub raw_payload: Value,
    pub updated_at: String,
}

/// Map a sanitized product entity.
///
/// # Errors
///
/// Returns [`MappingError::Shape`] when a field has an unexpected JSON type.
pub fn map_product(entity: &Value) -> Result<ProductRow, MappingError> {
    let source: ProductSource = serde_json::from_value(entity.clone())
        .map_err(|e| MappingError::shape(&EntityType::Product, e))?;
    let stock = source.stock.as_ref();

    Ok(ProductRow {
        wix_product_id: source.id.as_ref().and_then(ExternalId::to_text),
        name: source.name.as_deref().and_then(non_empty),
        sku: source.sku.clone(),
        price: Patch::from_option(source.price()),
        currency: Patch::from_option(source.currency()),
        stock_quantity: stock
            .map(|s| s.quantity.clone())
            .unwrap_or_default()
            .filter_map(|q| q.to_f64())
            .map(|q| q.round() as i64),
        in_stock: stock.map(|s| s.in_stock.clone()).unwrap_or_default(),
        visible: source.visible.clone(),
        raw_payload: entity.clone(),
        updated_at: now_rfc3339(),
    })
}

#[cfg(test)]
#[path = "product_tests.rs"]
mod tests;
