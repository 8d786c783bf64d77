//! Dynamic attribute fields: each exported attribute becomes a list-valued
//! feed field named by its display label.

use std::collections::BTreeMap;
use tracing::warn;

use crate::error::MappingError;
use crate::mapper::push_unique;
use crate::models::{AttributeDefinition, AttributeValue, Product};

/// Decode a raw attribute value into display values.
pub fn decode(
    definition: &AttributeDefinition,
    value: &AttributeValue,
) -> Result<Vec<String>, MappingError> {
    match value {
        AttributeValue::Flag(true) => Ok(vec!["Yes".to_string()]),
        AttributeValue::Flag(false) => Ok(vec![]),
        AttributeValue::Option(id) => Ok(vec![option_label(definition, *id)?]),
        AttributeValue::Options(ids) => ids.iter().map(|id| option_label(definition, *id)).collect(),
        AttributeValue::Text(text) => {
            if !definition.options.is_empty() {
                // multiselect values are stored as comma separated option ids
                let ids: Option<Vec<u64>> =
                    text.split(',').map(|part| part.trim().parse().ok()).collect();
                if let Some(ids) = ids {
                    return ids.iter().map(|id| option_label(definition, *id)).collect();
                }
            }
            Ok(vec![text.trim().to_string()])
        }
    }
}

fn option_label(definition: &AttributeDefinition, id: u64) -> Result<String, MappingError> {
    definition
        .options
        .get(&id)
        .cloned()
        .ok_or_else(|| MappingError::Decode {
            attribute: definition.code.clone(),
            message: format!("unknown option id {id}"),
        })
}

/// Collects attribute values of a product and its children.
#[derive(Debug, Default)]
pub struct AttributeFields {
    fields: BTreeMap<String, Vec<String>>,
}

impl AttributeFields {
    /// Append the values of every exported attribute set on `product`.
    ///
    /// An attribute that fails to decode is logged and skipped.
    pub fn collect(&mut self, product: &Product, definitions: &[AttributeDefinition]) {
        for definition in definitions {
            let Some(value) = product.attributes.get(&definition.code) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match decode(definition, value) {
                Ok(values) => {
                    let field = self.fields.entry(definition.label.clone()).or_default();
                    for v in &values {
                        push_unique(field, v);
                    }
                }
                Err(e) => {
                    warn!(
                        product_id = product.id,
                        attribute = %definition.code,
                        error = %e,
                        "Skipping attribute that could not be decoded"
                    );
                }
            }
        }
    }

    /// Fields with at least one value, minus those whose label would shadow `reserved`.
    pub fn into_fields(self, reserved: &[&str]) -> BTreeMap<String, Vec<String>> {
        self.fields
            .into_iter()
            .filter(|(label, values)| {
                !values.is_empty() && !reserved.iter().any(|r| r.eq_ignore_ascii_case(label))
            })
            .collect()
    }
}
