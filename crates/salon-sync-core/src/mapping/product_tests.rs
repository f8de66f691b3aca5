//! Tests for product mapping.

use super::*;
use serde_json::json;

/// Verify the Wix Stores v1 catalog shape.
#[test]
fn test_stores_product() {
    let row = map_product(&json!({
        "id": "p-1",
        "name": "Argan Oil 100ml",
        "sku": "ARG-100",
        "visible": true,
        "productType": "physical",
        "priceData": { "price": 18.5, "currency": "EUR" },
        "stock": { "trackInventory": true, "quantity": 12, "inStock": true }
    }))
    .unwrap();

    assert_eq!(row.wix_product_id.as_deref(), Some("p-1"));
    assert_eq!(row.name.as_deref(), Some("Argan Oil 100ml"));
    assert_eq!(row.sku, Patch::Value("ARG-100".to_string()));
    assert_eq!(row.price, Patch::Value(18.5));
    assert_eq!(row.currency, Patch::Value("EUR".to_string()));
    assert_eq!(row.stock_quantity, Patch::Value(12));
    assert_eq!(row.in_stock, Patch::Value(true));
    assert_eq!(row.visible, Patch::Value(true));
}

#[test]
fn test_price_variants() {
    let nested = map_product(&json!({ "id": "p", "name": "n", "price": { "price": "7.25" } })).unwrap();
    assert_eq!(nested.price, Patch::Value(7.25));

    let flat = map_product(&json!({ "id": "p", "name": "n", "price": 9, "currency": "USD" })).unwrap();
    assert_eq!(flat.price, Patch::Value(9.0));
    assert_eq!(flat.currency, Patch::Value("USD".to_string()));
}

#[test]
fn test_untracked_stock_is_omitted() {
    let row = map_product(&json!({ "id": "p", "name": "n" })).unwrap();
    assert_eq!(row.stock_quantity, Patch::Missing);
    assert_eq!(row.in_stock, Patch::Missing);
    assert_eq!(row.price, Patch::Missing);
}
