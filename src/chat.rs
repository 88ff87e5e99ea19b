use std::fmt::Write;

use tracing::error;

use crate::store::{ContentHit, DocumentStore};

pub const SEARCH_LIMIT: usize = 5;
pub const RECOMMEND_LIMIT: usize = 3;

const NO_RESULTS: &str = "I couldn't find any relevant products.";

/// What the chat side knows about the user.
#[derive(Debug, Default, Clone)]
pub struct UserContext {
    pub interests: Vec<String>,
    pub previous_purchases: Vec<String>,
}

/// Products whose content mentions `query`. Store errors yield no results.
pub async fn search_products<D: DocumentStore>(
    store: &D,
    query: &str,
    category: Option<&str>,
) -> Vec<ContentHit> {
    match store.search_content(query, category, SEARCH_LIMIT).await {
        Ok(hits) => hits,
        Err(e) => {
            error!("Error searching products: {}", e);
            Vec::new()
        }
    }
}

/// Products in a category the user likes, or ones they bought before.
pub async fn recommendations<D: DocumentStore>(store: &D, ctx: &UserContext) -> Vec<ContentHit> {
    match store
        .find_related(&ctx.interests, &ctx.previous_purchases, RECOMMEND_LIMIT)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            error!("Error getting recommendations: {}", e);
            Vec::new()
        }
    }
}

pub fn format_product_response(products: &[ContentHit]) -> String {
    if products.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut out = String::from("Here are some products that might interest you:\n\n");
    for p in products {
        let id = non_empty(&p.metadata.product_id).unwrap_or("N/A");
        let price = non_empty(&p.metadata.price).unwrap_or("0.00");
        let _ = write!(out, "🔹 {}\nPrice: ${}\n{}\n\n", id, price, p.content);
    }
    out
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
