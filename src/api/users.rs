use crate::database::DbPool;
use crate::middleware::auth::current_identity;
use crate::services::user_service::{self, LoginTracking};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

#[utoipa::path(
    post,
    path = "/api/v1/users/create",
    tag = "Users",
    responses(
        (status = 200, description = "User already existed"),
        (status = 201, description = "User created"),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Database unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_user(pool: web::Data<DbPool>, req: HttpRequest) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };
    log::info!("📝 POST /users/create - {}", identity.sub);

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => {
            log::error!("❌ User store unavailable: {}", e);
            return e.error_response();
        }
    };

    match user_service::ensure_user(&db, &identity).await {
        Ok((created, user)) => {
            let body = serde_json::json!({
                "success": true,
                "created": created,
                "exists": !created,
                "user": user,
            });
            if created {
                HttpResponse::Created().json(body)
            } else {
                HttpResponse::Ok().json(body)
            }
        }
        Err(e) => {
            log::error!("❌ User create failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ActivityRequest {
    pub action: String,
}

pub async fn update_activity(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    request: web::Json<ActivityRequest>,
) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    if request.action != "login" {
        return HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "No activity recorded for this action",
        }));
    }

    match user_service::record_login(&db, &identity.sub).await {
        Ok(LoginTracking::Updated) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "User activity updated successfully",
        })),
        // 202 tells the client the race with user creation is expected and
        // the update should be retried later
        Ok(LoginTracking::UserNotFoundYet) => HttpResponse::Accepted().json(serde_json::json!({
            "success": false,
            "message": "User not found in database yet",
            "code": "USER_NOT_FOUND",
        })),
        Err(e) => {
            log::error!("❌ Activity update failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}
