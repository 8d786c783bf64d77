//! Order rows.

use async_trait::async_trait;
use serde::Serialize;

use crate::context::RunContext;
use crate::document::FeedRow;
use crate::error::MappingError;
use crate::mapper::{wrong_entity, RowMapper};
use crate::models::FeedEntity;
use crate::pricing::format_amount;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OrderDocument {
    id: String,
    order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_id: Option<String>,
    email: String,
    date: String,
    currency: String,
    total: String,
    items: Vec<OrderItemDocument>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OrderItemDocument {
    product_id: String,
    sku: String,
    quantity: String,
    price: String,
}

#[derive(Debug, Default)]
pub struct OrderMapper;

#[async_trait]
impl RowMapper for OrderMapper {
    async fn map(
        &self,
        entity: &FeedEntity,
        _context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError> {
        let FeedEntity::Order(order) = entity else {
            return Err(wrong_entity("order", entity));
        };

        let document = OrderDocument {
            id: order.id.to_string(),
            order_number: order.increment_id.clone(),
            customer_id: order.customer_id.map(|id| id.to_string()),
            email: order.email.trim().to_lowercase(),
            date: order.created_at.to_rfc3339(),
            currency: order.currency.clone(),
            total: format_amount(order.grand_total),
            items: order
                .items
                .iter()
                .map(|item| OrderItemDocument {
                    product_id: item.product_id.to_string(),
                    sku: item.sku.clone(),
                    quantity: item.qty.normalize().to_string(),
                    price: format_amount(item.price),
                })
                .collect(),
        };
        Ok(Some(FeedRow::from_document(order.id.to_string(), &document)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::test_support::context;
    use crate::models::{Order, OrderItem};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    #[tokio::test]
    async fn guest_order_has_no_customer_id() {
        let order = Order {
            id: 900,
            increment_id: "100000900".into(),
            customer_id: None,
            email: "guest@example.com".into(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            currency: "GBP".into(),
            grand_total: Decimal::new(3450, 2),
            items: vec![OrderItem {
                product_id: 10,
                sku: "TEE".into(),
                qty: Decimal::new(2000, 3),
                price: Decimal::new(1725, 2),
            }],
        };

        let row = OrderMapper
            .map(&FeedEntity::Order(order), &context())
            .await
            .unwrap()
            .unwrap();

        assert!(row.field("CustomerId").is_none());
        assert_eq!(row.body["Total"], "34.50");
        assert_eq!(
            row.body["Items"],
            json!([{ "ProductId": "10", "Sku": "TEE", "Quantity": "2", "Price": "17.25" }])
        );
    }
}
