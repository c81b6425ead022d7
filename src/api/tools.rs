use crate::database::DbPool;
use crate::middleware::auth::current_identity;
use crate::models::ToolUpload;
use crate::services::tool_service::{self, CascadeReport, UploadReport};
use crate::services::library_service::{self, LikeStatus, SaveStatus};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

#[utoipa::path(
    post,
    path = "/api/v1/tools/upload",
    tag = "Tools",
    request_body = Vec<ToolUpload>,
    responses(
        (status = 200, description = "Tools inserted", body = UploadReport),
        (status = 400, description = "Validation failure")
    )
)]
pub async fn upload_tools(
    pool: web::Data<DbPool>,
    request: web::Json<Vec<ToolUpload>>,
) -> HttpResponse {
    log::info!("📦 POST /tools/upload - {} items", request.len());

    let db = match pool.tools_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    match tool_service::upload_tools(&db, request.into_inner()).await {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "inserted_count": report.inserted_count,
            "skipped": report.skipped,
            "message": format!("Successfully added {} tools", report.inserted_count),
        })),
        Err(e) => {
            log::warn!("❌ Tool upload failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/tools/{id}",
    tag = "Tools",
    params(
        ("id" = String, Path, description = "Tool id")
    ),
    responses(
        (status = 200, description = "Tool deleted with all user references cleaned", body = CascadeReport),
        (status = 400, description = "Invalid tool id"),
        (status = 404, description = "Tool not found")
    )
)]
pub async fn delete_tool(pool: web::Data<DbPool>, path: web::Path<String>) -> HttpResponse {
    let tool_id = match tool_service::parse_tool_id(&path) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let (db_tools, db_users) = match (pool.tools_db().await, pool.users_db().await) {
        (Ok(tools), Ok(users)) => (tools, users),
        (Err(e), _) | (_, Err(e)) => return e.error_response(),
    };

    match tool_service::delete_tool(&db_tools, &db_users, &tool_id).await {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Tool deleted successfully",
            "cleaned_up_users": report.cleaned_users,
            "failed_user_updates": report.failed_users,
        })),
        Err(e) => {
            log::error!("❌ Delete tool {} failed: {}", tool_id, e);
            e.error_response()
        }
    }
}

// ==================== LIKES ====================

pub async fn like_status(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::like_status(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Like)
    })
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/{id}/like",
    tag = "Tools",
    params(
        ("id" = String, Path, description = "Tool id")
    ),
    responses(
        (status = 200, description = "Tool liked", body = LikeStatus),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Tool or user not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn like_tool(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::like_tool(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Like)
    })
    .await
}

pub async fn unlike_tool(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::unlike_tool(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Like)
    })
    .await
}

// ==================== SAVES ====================

pub async fn save_status(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::save_status(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Save)
    })
    .await
}

pub async fn save_tool(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::save_tool(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Save)
    })
    .await
}

pub async fn unsave_tool(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> HttpResponse {
    with_library(pool, req, path, |db_tools, db_users, clerk_id, tool_id| async move {
        library_service::unsave_tool(&db_tools, &db_users, &clerk_id, &tool_id)
            .await
            .map(Outcome::Save)
    })
    .await
}

enum Outcome {
    Like(LikeStatus),
    Save(SaveStatus),
}

/// Shared plumbing for the per-tool library handlers: identity, stores,
/// tool-id parsing, then the specific service call
async fn with_library<F, Fut>(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
    operation: F,
) -> HttpResponse
where
    F: FnOnce(crate::database::MongoDB, crate::database::MongoDB, String, mongodb::bson::oid::ObjectId) -> Fut,
    Fut: std::future::Future<Output = Result<Outcome, crate::utils::error::AppError>>,
{
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };

    let tool_id = match tool_service::parse_tool_id(&path) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let (db_tools, db_users) = match (pool.tools_db().await, pool.users_db().await) {
        (Ok(tools), Ok(users)) => (tools, users),
        (Err(e), _) | (_, Err(e)) => return e.error_response(),
    };

    match operation(db_tools, db_users, identity.sub, tool_id).await {
        Ok(Outcome::Like(status)) => HttpResponse::Ok().json(status),
        Ok(Outcome::Save(status)) => HttpResponse::Ok().json(status),
        Err(e) => {
            log::warn!("❌ Library operation on {} failed: {}", tool_id, e);
            e.error_response()
        }
    }
}
