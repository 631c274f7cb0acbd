use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Notes,
    Video,
    Link,
    Book,
}

impl ResourceKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "notes" => Some(ResourceKind::Notes),
            "video" => Some(ResourceKind::Video),
            "link" => Some(ResourceKind::Link),
            "book" => Some(ResourceKind::Book),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Resource {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub achiever_id: ObjectId,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub kind: ResourceKind,
    pub exam_category: Option<String>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateResourceDto {
    #[validate(length(min = 3, max = 150, message = "Title must be 3-150 characters"))]
    pub title: String,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
    #[validate(url(message = "Invalid URL"))]
    pub url: String,
    pub kind: ResourceKind,
    pub exam_category: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ResourceResponse {
    pub id: String,
    pub achiever_id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub kind: ResourceKind,
    pub exam_category: Option<String>,
    pub created_at: String,
}

impl From<Resource> for ResourceResponse {
    fn from(r: Resource) -> Self {
        ResourceResponse {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            achiever_id: r.achiever_id.to_hex(),
            title: r.title,
            description: r.description,
            url: r.url,
            kind: r.kind,
            exam_category: r.exam_category,
            created_at: iso(&r.created_at),
        }
    }
}
