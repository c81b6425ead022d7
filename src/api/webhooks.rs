use crate::database::DbPool;
use crate::razorpay::{RazorpayState, WebhookEvent};
use crate::services::subscription_service;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

/// Gateway-initiated delivery. Signature verification runs over the exact
/// raw body bytes BEFORE any parsing; a parsed-then-verified body would open
/// a formatting-based signature bypass.
pub async fn razorpay_webhook(
    pool: web::Data<DbPool>,
    gateway: web::Data<RazorpayState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let signature = match req
        .headers()
        .get("x-razorpay-signature")
        .and_then(|value| value.to_str().ok())
    {
        Some(signature) => signature.to_string(),
        None => {
            log::error!("❌ Missing Razorpay signature in webhook");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": "Missing signature",
            }));
        }
    };

    let client = match gateway.require() {
        Ok(client) => client,
        Err(e) => return e.error_response(),
    };

    if !client.verify_webhook_signature(&body, &signature) {
        log::error!("🚫 Invalid webhook signature");
        return HttpResponse::BadRequest().json(serde_json::json!({
            "success": false,
            "error": "Invalid signature",
        }));
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            log::error!("❌ Unparseable webhook body: {}", e);
            return HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "error": "Invalid payload",
            }));
        }
    };

    log::info!("📨 Razorpay webhook received: {}", event.event);

    if event.event == "payment.captured" {
        let (payment, order) = match (&event.payload.payment, &event.payload.order) {
            (Some(payment), Some(order)) => (&payment.entity, &order.entity),
            _ => {
                log::error!("❌ payment.captured event missing payment or order entity");
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "success": false,
                    "error": "Invalid payload",
                }));
            }
        };

        let db = match pool.users_db().await {
            Ok(db) => db,
            Err(e) => {
                log::error!("❌ User store unavailable during webhook: {}", e);
                return e.error_response();
            }
        };

        if let Err(e) = subscription_service::handle_captured_payment(&db, payment, order).await {
            log::error!("❌ Webhook processing error: {}", e);
            return e.error_response();
        }
    }

    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}
