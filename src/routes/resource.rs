use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use validator::Validate;
use crate::db::DbConn;
use crate::guards::{AchieverGuard, AuthGuard};
use crate::models::{CreateResourceDto, Resource, ResourceKind, ResourceResponse};
use crate::utils::{ApiError, ApiResponse};

#[openapi(tag = "Resources")]
#[post("/resources", data = "<dto>")]
pub async fn create_resource(
    db: &State<DbConn>,
    achiever: AchieverGuard,
    dto: Json<CreateResourceDto>,
) -> Result<Json<ApiResponse<ResourceResponse>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();

    let mut resource = Resource {
        id: None,
        achiever_id: achiever.auth.user_id,
        title: dto.title.trim().to_string(),
        description: dto.description,
        url: dto.url,
        kind: dto.kind,
        exam_category: dto.exam_category.or_else(|| achiever.user.exam_category.clone()),
        created_at: DateTime::now(),
    };

    let res = db
        .collection::<Resource>("resources")
        .insert_one(&resource, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to share resource: {}", e)))?;
    resource.id = res.inserted_id.as_object_id();

    Ok(Json(ApiResponse::success_with_message(
        "Resource shared",
        ResourceResponse::from(resource),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct ResourceQuery {
    pub exam_category: Option<String>,
    pub kind: Option<String>,
    pub achiever: Option<String>,
}

#[openapi(tag = "Resources")]
#[get("/resources?<query..>")]
pub async fn list_resources(
    db: &State<DbConn>,
    query: ResourceQuery,
) -> Result<Json<ApiResponse<Vec<ResourceResponse>>>, ApiError> {
    let mut filter = doc! {};
    if let Some(ref category) = query.exam_category {
        filter.insert("exam_category", category);
    }
    if let Some(ref kind) = query.kind {
        ResourceKind::parse(kind).ok_or_else(|| ApiError::bad_request("Invalid resource kind"))?;
        filter.insert("kind", kind);
    }
    if let Some(ref achiever) = query.achiever {
        let achiever_id = ObjectId::parse_str(achiever)
            .map_err(|_| ApiError::bad_request("Invalid achiever ID"))?;
        filter.insert("achiever_id", achiever_id);
    }

    let find_options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();

    let resources: Vec<Resource> = db
        .collection::<Resource>("resources")
        .find(filter, find_options)
        .await?
        .try_collect()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?;

    Ok(Json(ApiResponse::success(
        resources.into_iter().map(ResourceResponse::from).collect(),
    )))
}

#[openapi(tag = "Resources")]
#[delete("/resources/<resource_id>")]
pub async fn delete_resource(
    db: &State<DbConn>,
    auth: AuthGuard,
    resource_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let object_id = ObjectId::parse_str(&resource_id)
        .map_err(|_| ApiError::bad_request("Invalid resource ID"))?;

    let resource = db
        .collection::<Resource>("resources")
        .find_one(doc! { "_id": object_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Resource not found"))?;

    if resource.achiever_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::forbidden("Only the owner or an admin can delete this resource"));
    }

    db.collection::<Resource>("resources")
        .delete_one(doc! { "_id": object_id }, None)
        .await?;

    Ok(Json(ApiResponse::success_with_message("Resource deleted", ())))
}
