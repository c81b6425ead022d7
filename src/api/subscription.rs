use crate::database::DbPool;
use crate::middleware::auth::current_identity;
use crate::razorpay::RazorpayState;
use crate::services::subscription_service::{self, CreatedOrder, SubscriptionStatus};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

#[utoipa::path(
    get,
    path = "/api/v1/user/subscription",
    tag = "Subscription",
    responses(
        (status = 200, description = "Current subscription status and limits", body = SubscriptionStatus),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_subscription(pool: web::Data<DbPool>, req: HttpRequest) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    match subscription_service::subscription_status(&db, &identity.sub).await {
        Ok(subscription) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "subscription": subscription,
        })),
        Err(e) => {
            log::warn!("❌ Get subscription failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateOrderRequest {
    pub plan_amount: i64,
}

#[utoipa::path(
    post,
    path = "/api/v1/user/subscription",
    tag = "Subscription",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created for checkout", body = CreatedOrder),
        (status = 400, description = "Invalid plan amount"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Payment gateway failure")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_order(
    pool: web::Data<DbPool>,
    gateway: web::Data<RazorpayState>,
    req: HttpRequest,
    request: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };
    log::info!(
        "💳 POST /user/subscription - {} plan_amount: {}",
        identity.sub,
        request.plan_amount
    );

    let client = match gateway.require() {
        Ok(client) => client,
        Err(e) => return e.error_response(),
    };

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    match subscription_service::create_subscription_order(
        &db,
        client,
        &identity.sub,
        request.plan_amount,
    )
    .await
    {
        Ok(order) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Order created successfully",
            "order": order,
        })),
        Err(e) => {
            log::error!("❌ Order creation failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub plan_amount: i64,
}

#[utoipa::path(
    post,
    path = "/api/v1/user/subscription/verify",
    tag = "Subscription",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and balance updated", body = SubscriptionStatus),
        (status = 400, description = "Missing fields or invalid signature"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn verify_payment(
    pool: web::Data<DbPool>,
    gateway: web::Data<RazorpayState>,
    req: HttpRequest,
    request: web::Json<VerifyPaymentRequest>,
) -> HttpResponse {
    let identity = match current_identity(&req) {
        Ok(identity) => identity,
        Err(e) => return e.error_response(),
    };
    log::info!(
        "🔐 POST /user/subscription/verify - order: {} payment: {}",
        request.razorpay_order_id,
        request.razorpay_payment_id
    );

    if request.razorpay_order_id.is_empty()
        || request.razorpay_payment_id.is_empty()
        || request.razorpay_signature.is_empty()
    {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "error": "Missing required payment information",
        }));
    }

    let client = match gateway.require() {
        Ok(client) => client,
        Err(e) => return e.error_response(),
    };

    let db = match pool.users_db().await {
        Ok(db) => db,
        Err(e) => return e.error_response(),
    };

    match subscription_service::verify_and_apply(
        &db,
        client,
        &identity.sub,
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
        request.plan_amount,
    )
    .await
    {
        Ok(subscription) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Payment verified and subscription updated successfully",
            "subscription": subscription,
        })),
        Err(e) => {
            log::warn!("❌ Payment verification failed for {}: {}", identity.sub, e);
            e.error_response()
        }
    }
}
