use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::db::DbConn;
use crate::guards::{AchieverGuard, AuthGuard, MaybeAuth};
use crate::models::{
    normalize_tags, CreateCommentDto, CreatePostDto, MentorPost, PostComment, PostResponse, User,
};
use crate::routes::follow::followed_ids;
use crate::utils::{ApiError, ApiResponse, Page};

async fn load_post(db: &DbConn, post_id: &str) -> Result<MentorPost, ApiError> {
    let object_id = ObjectId::parse_str(post_id)
        .map_err(|_| ApiError::bad_request("Invalid post ID"))?;

    db.collection::<MentorPost>("mentor_posts")
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

#[openapi(tag = "Mentor Posts")]
#[post("/mentor-posts", data = "<dto>")]
pub async fn create_post(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<CreatePostDto>,
) -> Result<Json<ApiResponse<PostResponse>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();

    let content = dto.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("Post cannot be empty"));
    }

    let now = DateTime::now();
    let mut post = MentorPost {
        id: None,
        author_id: achiever.auth.user_id,
        author_name: achiever.user.name.clone(),
        content,
        image_url: dto.image_url.filter(|u| !u.trim().is_empty()),
        tags: normalize_tags(dto.tags.unwrap_or_default()),
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let res = db
        .collection::<MentorPost>("mentor_posts")
        .insert_one(&post, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create post: {}", e)))?;
    post.id = res.inserted_id.as_object_id();

    Ok(Json(ApiResponse::success_with_message(
        "Post published",
        PostResponse::for_viewer(post, Some(&achiever.auth.user_id)),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct FeedQuery {
    pub author: Option<String>,
    /// Only posts by achievers the caller follows.
    pub following: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Mentor Posts")]
#[get("/mentor-posts?<query..>")]
pub async fn get_feed(
    db: &State<DbConn>,
    viewer: MaybeAuth,
    query: FeedQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit);
    let viewer_id = viewer.0.as_ref().map(|a| a.user_id);

    let mut filter = doc! {};
    if let Some(ref author) = query.author {
        let author_id = ObjectId::parse_str(author)
            .map_err(|_| ApiError::bad_request("Invalid author ID"))?;
        filter.insert("author_id", author_id);
    } else if query.following.unwrap_or(false) {
        let user_id = viewer_id.ok_or_else(|| ApiError::unauthorized("Sign in to see posts from people you follow"))?;
        let ids = followed_ids(db, user_id).await?;
        filter.insert("author_id", doc! { "$in": ids });
    }

    let find_options = FindOptions::builder()
        .skip(page.skip())
        .limit(page.limit)
        .sort(doc! { "created_at": -1 })
        .build();

    let posts: Vec<MentorPost> = db
        .collection::<MentorPost>("mentor_posts")
        .find(filter.clone(), find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    let total = db
        .collection::<MentorPost>("mentor_posts")
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    let posts: Vec<PostResponse> = posts
        .into_iter()
        .map(|p| PostResponse::for_viewer(p, viewer_id.as_ref()))
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "posts": posts,
        "pagination": page.meta(total),
    }))))
}

#[openapi(tag = "Mentor Posts")]
#[post("/mentor-posts/<post_id>/like")]
pub async fn toggle_like(
    db: &State<DbConn>,
    auth: AuthGuard,
    post_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let post = load_post(db, &post_id).await?;
    let liked = post.likes.contains(&auth.user_id);

    let update = if liked {
        doc! { "$pull": { "likes": auth.user_id } }
    } else {
        doc! { "$addToSet": { "likes": auth.user_id } }
    };

    db.collection::<MentorPost>("mentor_posts")
        .update_one(doc! { "_id": post.id }, update, None)
        .await?;

    let like_count = if liked { post.likes.len() - 1 } else { post.likes.len() + 1 };

    Ok(Json(ApiResponse::success(serde_json::json!({
        "liked": !liked,
        "like_count": like_count,
    }))))
}

#[openapi(tag = "Mentor Posts")]
#[post("/mentor-posts/<post_id>/comments", data = "<dto>")]
pub async fn add_comment(
    db: &State<DbConn>,
    auth: AuthGuard,
    post_id: String,
    dto: Json<CreateCommentDto>,
) -> Result<Json<ApiResponse<PostResponse>>, ApiError> {
    dto.validate()?;
    let text = dto.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Comment cannot be empty"));
    }

    let post = load_post(db, &post_id).await?;

    let user = db
        .collection::<User>("users")
        .find_one(doc! { "_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let comment = PostComment {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: auth.user_id,
        user_name: user.name,
        text: text.to_string(),
        created_at: DateTime::now(),
    };
    let bson = to_bson(&comment).map_err(|e| ApiError::internal_error(e.to_string()))?;

    db.collection::<MentorPost>("mentor_posts")
        .update_one(
            doc! { "_id": post.id },
            doc! { "$push": { "comments": bson }, "$set": { "updated_at": DateTime::now() } },
            None,
        )
        .await?;

    let updated = load_post(db, &post_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Comment added",
        PostResponse::for_viewer(updated, Some(&auth.user_id)),
    )))
}

#[openapi(tag = "Mentor Posts")]
#[delete("/mentor-posts/<post_id>")]
pub async fn delete_post(
    db: &State<DbConn>,
    auth: AuthGuard,
    post_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let post = load_post(db, &post_id).await?;

    if post.author_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Only the author or an admin can delete this post"));
    }

    db.collection::<MentorPost>("mentor_posts")
        .delete_one(doc! { "_id": post.id }, None)
        .await?;

    info!("Post {} deleted by {}", post_id, auth.user_id);

    Ok(Json(ApiResponse::success_with_message("Post deleted", ())))
}
