use crate::database::DbPool;
use crate::middleware::auth::current_identity;
use crate::services::{library_service, tool_service};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateFolderRequest {
    pub name: String,
}

pub async fn create_folder(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    request: web::Json<CreateFolderRequest>,
) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };
    log::info!("📁 POST /user/folders - {} '{}'", identity.sub, request.name);

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    match library_service::create_folder(&db, &identity.sub, &request.name).await {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "message": "Folder created successfully",
        })),
        Err(e) => {
            log::warn!("❌ Folder create failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddToFolderRequest {
    pub tool_id: String,
}

pub async fn add_tool_to_folder(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    path: web::Path<String>,
    request: web::Json<AddToFolderRequest>,
) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };

    let tool_id = match tool_service::parse_tool_id(&request.tool_id) {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    let (db_tools, db_users) = match (pool.tools_db().await, pool.users_db().await) {
        (Ok(tools), Ok(users)) => (tools, users),
        (Err(e), _) | (_, Err(e)) => return e.error_response(),
    };

    match library_service::add_tool_to_folder(&db_tools, &db_users, &identity.sub, &path, &tool_id)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Tool added to folder",
        })),
        Err(e) => {
            log::warn!("❌ Add to folder failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}
