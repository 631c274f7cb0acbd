use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use super::iso;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostComment {
    pub id: String,
    pub user_id: ObjectId,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MentorPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub author_id: ObjectId,
    pub author_name: String,
    pub content: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<ObjectId>,
    #[serde(default)]
    pub comments: Vec<PostComment>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreatePostDto {
    #[validate(length(min = 1, max = 2000, message = "Post must be 1-2000 characters"))]
    pub content: String,
    pub image_url: Option<String>,
    #[validate(length(max = 10, message = "At most 10 tags"))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateCommentDto {
    #[validate(length(min = 1, max = 500, message = "Comment must be 1-500 characters"))]
    pub text: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CommentResponse {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PostResponse {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub like_count: usize,
    pub liked_by_me: bool,
    pub comments: Vec<CommentResponse>,
    pub created_at: String,
}

impl PostResponse {
    pub fn for_viewer(post: MentorPost, viewer: Option<&ObjectId>) -> Self {
        PostResponse {
            id: post.id.map(|id| id.to_hex()).unwrap_or_default(),
            author_id: post.author_id.to_hex(),
            author_name: post.author_name,
            content: post.content,
            image_url: post.image_url,
            tags: post.tags,
            like_count: post.likes.len(),
            liked_by_me: viewer.map(|v| post.likes.contains(v)).unwrap_or(false),
            comments: post
                .comments
                .into_iter()
                .map(|c| CommentResponse {
                    id: c.id,
                    user_id: c.user_id.to_hex(),
                    user_name: c.user_name,
                    text: c.text,
                    created_at: iso(&c.created_at),
                })
                .collect(),
            created_at: iso(&post.created_at),
        }
    }
}

/// Trims, lowercases and de-duplicates post tags, keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags(vec![" #UPSC".into(), "upsc".into(), "".into(), "Strategy ".into()]);
        assert_eq!(tags, vec!["upsc", "strategy"]);
    }

    #[test]
    fn viewer_like_flag() {
        let viewer = ObjectId::new();
        let post = MentorPost {
            id: Some(ObjectId::new()),
            author_id: ObjectId::new(),
            author_name: "Kiran".into(),
            content: "Revise daily".into(),
            image_url: None,
            tags: vec![],
            likes: vec![viewer],
            comments: vec![],
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        };
        let seen = PostResponse::for_viewer(post.clone(), Some(&viewer));
        assert!(seen.liked_by_me);
        assert_eq!(seen.like_count, 1);

        let anonymous = PostResponse::for_viewer(post, None);
        assert!(!anonymous.liked_by_me);
    }
}
