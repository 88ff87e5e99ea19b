use serde::{Deserialize, Serialize};

use crate::product::ProductRecord;

pub const CONTENT_TYPE_PRODUCT: &str = "product";

pub const LABEL_PRODUCT: &str = "Product:";
pub const LABEL_DESCRIPTION: &str = "Description:";
pub const LABEL_BENEFITS: &str = "Benefits:";
pub const LABEL_INGREDIENTS: &str = "Ingredients:";

const MISSING: &str = "N/A";
const DEFAULT_PRICE: &str = "0.00";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentMetadata {
    pub product_id: String,
    pub category: String,
    pub price: String,
    pub url: String,
}

/// Shape of a `rag_content` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub metadata: ContentMetadata,
}

impl ContentDocument {
    pub fn from_record(record: &ProductRecord) -> Self {
        Self {
            content: render(record),
            content_type: CONTENT_TYPE_PRODUCT.to_string(),
            metadata: ContentMetadata {
                product_id: record.product_id(),
                category: record.category.clone(),
                price: record.price.clone().unwrap_or_else(|| DEFAULT_PRICE.into()),
                url: record.url.clone().unwrap_or_else(|| MISSING.into()),
            },
        }
    }
}

/// Flatten a record into the labeled text blob stored for retrieval.
pub fn render(record: &ProductRecord) -> String {
    format!(
        "{} {}\n{} {}\n{} {}\n{} {}",
        LABEL_PRODUCT,
        record.name.as_deref().unwrap_or(MISSING),
        LABEL_DESCRIPTION,
        record.description.as_deref().unwrap_or(MISSING),
        LABEL_BENEFITS,
        record.benefits.join(", "),
        LABEL_INGREDIENTS,
        record.ingredients.as_deref().unwrap_or(MISSING),
    )
}
