use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Collection, Database};
use serde::Serialize;

use crate::content::{ContentDocument, ContentMetadata};

pub const RAG_CONTENT: &str = "rag_content";
pub const PRODUCTS: &str = "products";

/// What query callers get back: the text and its metadata, no store id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentHit {
    pub content: String,
    pub metadata: ContentMetadata,
}

impl From<ContentDocument> for ContentHit {
    fn from(doc: ContentDocument) -> Self {
        Self {
            content: doc.content,
            metadata: doc.metadata,
        }
    }
}

pub struct CategoryCounts {
    pub total: u64,
    pub by_category: Vec<(String, u64)>,
}

/// Document store holding retrieval content and the product catalog.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Single insert, no existence check. Returns the store-generated id.
    async fn insert_content(&self, doc: &ContentDocument) -> Result<String>;

    /// Case-insensitive substring match on `content`, optionally restricted
    /// to one category.
    async fn search_content(
        &self,
        text: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ContentHit>>;

    /// Documents in any of `categories` or describing any of `product_ids`.
    async fn find_related(
        &self,
        categories: &[String],
        product_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ContentHit>>;

    /// Catalog entry by exact `product_id`, without the internal `_id`.
    async fn product(&self, product_id: &str) -> Result<Option<serde_json::Value>>;

    async fn category_counts(&self) -> Result<CategoryCounts>;
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn content(&self) -> Collection<ContentDocument> {
        self.db.collection(RAG_CONTENT)
    }

    async fn collect(&self, filter: Document, limit: usize) -> Result<Vec<ContentHit>> {
        let mut cursor = self.content().find(filter).limit(limit as i64).await?;
        let mut hits = Vec::new();
        while cursor.advance().await? {
            hits.push(cursor.deserialize_current()?.into());
        }
        Ok(hits)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_content(&self, doc: &ContentDocument) -> Result<String> {
        let result = self.content().insert_one(doc).await?;
        Ok(match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        })
    }

    async fn search_content(
        &self,
        text: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ContentHit>> {
        self.collect(search_filter(text, category), limit).await
    }

    async fn find_related(
        &self,
        categories: &[String],
        product_ids: &[String],
        limit: usize,
    ) -> Result<Vec<ContentHit>> {
        self.collect(related_filter(categories, product_ids), limit).await
    }

    async fn product(&self, product_id: &str) -> Result<Option<serde_json::Value>> {
        let found = self
            .db
            .collection::<Document>(PRODUCTS)
            .find_one(doc! { "product_id": product_id })
            .projection(doc! { "_id": 0 })
            .await?;
        Ok(found.map(|d| Bson::Document(d).into_relaxed_extjson()))
    }

    async fn category_counts(&self) -> Result<CategoryCounts> {
        let coll = self.content();
        let total = coll.count_documents(doc! {}).await?;
        let mut by_category = Vec::new();
        for value in coll.distinct("metadata.category", doc! {}).await? {
            if let Bson::String(category) = value {
                let n = coll
                    .count_documents(doc! { "metadata.category": category.as_str() })
                    .await?;
                by_category.push((category, n));
            }
        }
        Ok(CategoryCounts { total, by_category })
    }
}

/// Query text is matched literally, not as a regex.
fn search_filter(text: &str, category: Option<&str>) -> Document {
    let mut filter = doc! {
        "content": { "$regex": regex::escape(text), "$options": "i" }
    };
    if let Some(c) = category {
        filter.insert("metadata.category", c);
    }
    filter
}

fn related_filter(categories: &[String], product_ids: &[String]) -> Document {
    doc! {
        "$or": [
            { "metadata.category": { "$in": categories.to_vec() } },
            { "metadata.product_id": { "$in": product_ids.to_vec() } },
        ]
    }
}
