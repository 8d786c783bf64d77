//! Customer (user feed) rows.

use async_trait::async_trait;
use serde::Serialize;

use crate::context::RunContext;
use crate::document::FeedRow;
use crate::error::MappingError;
use crate::mapper::{wrong_entity, RowMapper};
use crate::models::FeedEntity;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserDocument {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    customer_group: String,
    created: String,
}

#[derive(Debug, Default)]
pub struct UserMapper;

#[async_trait]
impl RowMapper for UserMapper {
    async fn map(
        &self,
        entity: &FeedEntity,
        _context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError> {
        let FeedEntity::User(customer) = entity else {
            return Err(wrong_entity("user", entity));
        };

        let document = UserDocument {
            id: customer.id.to_string(),
            email: customer.email.trim().to_lowercase(),
            first_name: customer.first_name.clone(),
            last_name: customer.last_name.clone(),
            customer_group: customer.group_id.to_string(),
            created: customer.created_at.to_rfc3339(),
        };
        Ok(Some(FeedRow::from_document(customer.id.to_string(), &document)?))
    }
}
