//! Category and brand rows. Brands are the direct children of the store's
//! configured brand parent category.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::context::RunContext;
use crate::document::FeedRow;
use crate::error::MappingError;
use crate::mapper::{wrong_entity, RowMapper};
use crate::models::{Category, FeedEntity};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CategoryDocument {
    id: String,
    title: String,
    link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    /// Names of the active ancestors, root first, ending with this category.
    path: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BrandDocument {
    id: String,
    title: String,
    link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

#[derive(Debug, Default)]
pub struct CategoryMapper;

#[async_trait]
impl RowMapper for CategoryMapper {
    async fn map(
        &self,
        entity: &FeedEntity,
        context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError> {
        let FeedEntity::Category(category) = entity else {
            return Err(wrong_entity("category", entity));
        };
        if !category.active {
            debug!(category_id = category.id, "Skipping inactive category");
            return Ok(None);
        }

        let document = CategoryDocument {
            id: category.id.to_string(),
            title: category.name.clone(),
            link: category.url.clone(),
            parent_id: category.parent_id.map(|id| id.to_string()),
            path: name_path(category, context),
        };
        Ok(Some(FeedRow::from_document(category.id.to_string(), &document)?))
    }
}

fn name_path(category: &Category, context: &RunContext) -> Vec<String> {
    let mut names: Vec<String> = category
        .path
        .split('/')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .filter(|id| *id != category.id)
        .filter_map(|id| context.category_name(id).map(str::to_string))
        .collect();
    names.push(category.name.clone());
    names
}

#[derive(Debug, Default)]
pub struct BrandMapper;

#[async_trait]
impl RowMapper for BrandMapper {
    async fn map(
        &self,
        entity: &FeedEntity,
        context: &RunContext,
    ) -> Result<Option<FeedRow>, MappingError> {
        let FeedEntity::Brand(brand) = entity else {
            return Err(wrong_entity("brand", entity));
        };
        if !context.brand_ids.contains(&brand.id) {
            debug!(category_id = brand.id, "Skipping category outside the brand parent");
            return Ok(None);
        }

        let document = BrandDocument {
            id: brand.id.to_string(),
            title: brand.name.clone(),
            link: brand.url.clone(),
            image: brand.image.clone(),
        };
        Ok(Some(FeedRow::from_document(brand.id.to_string(), &document)?))
    }
}
