// ==================== SUBSCRIPTION & RECONCILIATION ====================
// Applies verified payments to a user's balance exactly once, whether the
// confirmation arrives from the client or the gateway webhook (both can fire
// for the same payment). Idempotency is enforced by a single conditional
// update keyed on payment_id, not by a separate read-then-write.

use crate::database::MongoDB;
use crate::models::{PaymentRecord, SubscriptionOrder, User};
use crate::razorpay::{self, OrderEntity, PaymentEntity, RazorpayClient};
use crate::utils::error::AppError;
use mongodb::bson::{doc, to_bson, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

// Subscription constants
pub const FREE_TOOL_LIMIT: i64 = 20;
pub const FREE_FOLDER_LIMIT: i64 = 3;
pub const TOOLS_PER_DOLLAR: i64 = 10;
pub const FOLDERS_PER_DOLLAR: i64 = 1;

/// Entitlements are always derived from the accumulated balance, never stored
pub fn tool_limit(plan_amount: i64) -> i64 {
    if plan_amount > 0 {
        FREE_TOOL_LIMIT + plan_amount * TOOLS_PER_DOLLAR
    } else {
        FREE_TOOL_LIMIT
    }
}

pub fn folder_limit(plan_amount: i64) -> i64 {
    if plan_amount > 0 {
        FREE_FOLDER_LIMIT + plan_amount * FOLDERS_PER_DOLLAR
    } else {
        FREE_FOLDER_LIMIT
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SubscriptionStatus {
    pub is_subscribed: bool,
    pub plan_amount: i64,
    pub tool_limit: i64,
    pub folder_limit: i64,
    pub total_saved_tools: i64,
    pub current_folders: i64,
    pub can_save_more_tools: bool,
    pub can_create_more_folders: bool,
}

pub fn derive_status(user: &User) -> SubscriptionStatus {
    let limit_tools = tool_limit(user.plan_amount);
    let limit_folders = folder_limit(user.plan_amount);
    let total_saved = user.total_saved() as i64;
    let current_folders = user.folders.len() as i64;

    SubscriptionStatus {
        is_subscribed: user.plan_amount > 0,
        plan_amount: user.plan_amount,
        tool_limit: limit_tools,
        folder_limit: limit_folders,
        total_saved_tools: total_saved,
        current_folders,
        can_save_more_tools: total_saved < limit_tools,
        can_create_more_folders: current_folders < limit_folders,
    }
}

pub async fn subscription_status(
    db: &MongoDB,
    clerk_id: &str,
) -> Result<SubscriptionStatus, AppError> {
    let users = db.collection::<User>("users");
    let user = users
        .find_one(doc! { "clerk_id": clerk_id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    Ok(derive_status(&user))
}

// ==================== ORDER CREATION ====================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreatedOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    pub key_id: String,
}

/// Creates a gateway order and persists the order-to-buyer mapping the
/// webhook handler resolves later.
pub async fn create_subscription_order(
    db: &MongoDB,
    gateway: &RazorpayClient,
    clerk_id: &str,
    plan_amount: i64,
) -> Result<CreatedOrder, AppError> {
    if plan_amount < 1 {
        return Err(AppError::ValidationError(
            "Valid plan amount is required (minimum 1)".to_string(),
        ));
    }

    let users = db.collection::<User>("users");
    users
        .find_one(doc! { "clerk_id": clerk_id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    let receipt = razorpay::generate_receipt_id(clerk_id, plan_amount);
    let order = gateway.create_order(plan_amount, &receipt).await?;

    let orders = db.collection::<SubscriptionOrder>("subscription_orders");
    let mapping = SubscriptionOrder {
        id: None,
        order_id: order.id.clone(),
        clerk_id: clerk_id.to_string(),
        plan_amount,
        receipt: receipt.clone(),
        created_at: BsonDateTime::now(),
    };
    orders
        .insert_one(mapping)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to record order mapping: {}", e)))?;

    log::info!(
        "💳 Razorpay order created: {} ({} USD) for {}",
        order.id,
        plan_amount,
        clerk_id
    );

    Ok(CreatedOrder {
        id: order.id,
        amount: order.amount,
        currency: order.currency,
        receipt: order.receipt,
        key_id: gateway.key_id().to_string(),
    })
}

// ==================== RECONCILIATION ====================

#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub plan_amount: i64,
    pub created_at: BsonDateTime,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Balance incremented and payment recorded
    Applied,
    /// Payment id already present; duplicate delivery absorbed
    AlreadyRecorded,
}

/// Applies a verified payment exactly once. The filter excludes users whose
/// history already holds this payment_id, so the increment and the history
/// append happen in one conditional write; a racing duplicate simply
/// matches nothing.
pub async fn reconcile_payment(
    db: &MongoDB,
    clerk_id: &str,
    payment: PaymentInput,
) -> Result<ReconcileOutcome, AppError> {
    let users = db.collection::<User>("users");

    let record = PaymentRecord {
        order_id: payment.order_id.clone(),
        payment_id: payment.payment_id.clone(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        status: payment.status.clone(),
        plan_amount: payment.plan_amount,
        created_at: payment.created_at,
    };
    let record_bson =
        to_bson(&record).map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;

    let filter = doc! {
        "clerk_id": clerk_id,
        "payment_history.payment_id": { "$ne": &payment.payment_id },
    };
    let update = doc! {
        "$inc": { "plan_amount": payment.plan_amount },
        "$set": { "is_subscribed": true, "updated_at": BsonDateTime::now() },
        "$push": { "payment_history": record_bson },
    };

    let result = users
        .update_one(filter, update)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    if result.modified_count == 1 {
        log::info!(
            "✅ Payment {} applied to {} (+{} USD)",
            payment.payment_id,
            clerk_id,
            payment.plan_amount
        );
        return Ok(ReconcileOutcome::Applied);
    }

    // Nothing matched: either the payment was already recorded or the user
    // does not exist. Distinguish so webhook retries stay silent.
    let exists = users
        .find_one(doc! { "clerk_id": clerk_id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    match exists {
        Some(_) => {
            log::info!(
                "🔁 Payment {} already recorded for {}, skipping",
                payment.payment_id,
                clerk_id
            );
            Ok(ReconcileOutcome::AlreadyRecorded)
        }
        None => Err(AppError::NotFound("User".to_string())),
    }
}

/// Client-confirmation path: signature check first, nothing is touched on a
/// mismatch; then reconcile and return freshly derived entitlements.
pub async fn verify_and_apply(
    db: &MongoDB,
    gateway: &RazorpayClient,
    clerk_id: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
    plan_amount: i64,
) -> Result<SubscriptionStatus, AppError> {
    if plan_amount < 1 {
        return Err(AppError::ValidationError(
            "Valid plan amount is required (minimum 1)".to_string(),
        ));
    }

    if !gateway.verify_payment_signature(order_id, payment_id, signature) {
        log::warn!("🚫 Payment signature verification failed for {}", order_id);
        return Err(AppError::SignatureMismatch("payment".to_string()));
    }

    reconcile_payment(
        db,
        clerk_id,
        PaymentInput {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            amount: plan_amount * 100, // minor units for consistency with the gateway
            currency: "INR".to_string(),
            status: "captured".to_string(),
            plan_amount,
            created_at: BsonDateTime::now(),
        },
    )
    .await?;

    subscription_status(db, clerk_id).await
}

// ==================== WEBHOOK PATH ====================

/// Resolves the paying user for a captured payment. Primary source is the
/// subscription_orders mapping written at order creation; the positional
/// receipt decoding survives only as a fallback for pre-mapping orders.
async fn resolve_order_buyer(
    db: &MongoDB,
    order: &OrderEntity,
) -> Result<Option<(String, i64)>, AppError> {
    let orders = db.collection::<SubscriptionOrder>("subscription_orders");
    let mapping = orders
        .find_one(doc! { "order_id": &order.id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    if let Some(mapping) = mapping {
        return Ok(Some((mapping.clerk_id, mapping.plan_amount)));
    }

    match order.receipt.as_deref().and_then(razorpay::parse_receipt_id) {
        Some(parsed) => {
            log::warn!(
                "📜 No order mapping for {}, fell back to receipt decoding",
                order.id
            );
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Handles a verified payment.captured delivery. Webhooks are at-least-once,
/// so the reconciler's idempotency does the deduplication; a missing user is
/// logged and skipped because the gateway cannot act on an error reply.
pub async fn handle_captured_payment(
    db: &MongoDB,
    payment: &PaymentEntity,
    order: &OrderEntity,
) -> Result<(), AppError> {
    let (clerk_id, plan_amount) = match resolve_order_buyer(db, order).await? {
        Some(buyer) => buyer,
        None => {
            log::error!(
                "❓ Cannot resolve buyer for order {} (receipt: {:?})",
                order.id,
                order.receipt
            );
            return Ok(());
        }
    };

    let input = PaymentInput {
        payment_id: payment.id.clone(),
        order_id: order.id.clone(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        status: payment.status.clone(),
        plan_amount,
        created_at: BsonDateTime::from_millis(payment.created_at * 1000),
    };

    match reconcile_payment(db, &clerk_id, input).await {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => {
            log::error!("❓ User not found for webhook: {}", clerk_id);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Folder, SavedTool};

    #[test]
    fn test_free_tier_limits() {
        assert_eq!(tool_limit(0), 20);
        assert_eq!(folder_limit(0), 3);
    }

    #[test]
    fn test_paid_limits_scale_with_balance() {
        assert_eq!(tool_limit(1), 30);
        assert_eq!(tool_limit(5), 70);
        assert_eq!(folder_limit(1), 4);
        assert_eq!(folder_limit(5), 8);
    }

    #[test]
    fn test_derive_status() {
        let saved = SavedTool {
            name: "Writer".to_string(),
            logo_url: "https://example.com/l.png".to_string(),
            website_url: "https://example.com".to_string(),
            description: None,
            category: None,
            saved_at: BsonDateTime::now(),
        };
        let user = User {
            id: None,
            clerk_id: "user_1".to_string(),
            email: "a@b.com".to_string(),
            name: None,
            image: None,
            email_verified: None,
            is_active: true,
            last_login: None,
            liked_tools: vec![],
            saved_tools: vec![saved.clone()],
            folders: vec![Folder {
                name: "Work".to_string(),
                tools: vec![saved],
                created_at: BsonDateTime::now(),
            }],
            is_subscribed: true,
            plan_amount: 2,
            payment_history: vec![],
            created_at: None,
            updated_at: None,
        };

        let status = derive_status(&user);
        assert!(status.is_subscribed);
        assert_eq!(status.tool_limit, 40);
        assert_eq!(status.folder_limit, 5);
        assert_eq!(status.total_saved_tools, 2);
        assert_eq!(status.current_folders, 1);
        assert!(status.can_save_more_tools);
        assert!(status.can_create_more_folders);
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_reconcile_is_idempotent() {
        dotenv::dotenv().ok();
        let cache = crate::database::ConnectionCache::new(
            "users",
            "aitools_users_test",
            crate::database::MongoConfig::from_env("MONGODB_URI_USERS"),
        );
        let db = cache.connect().await.expect("connect");
        let users = db.collection::<User>("users");

        let clerk_id = format!("user_test_{}", uuid::Uuid::new_v4());
        let now = BsonDateTime::now();
        users
            .insert_one(User {
                id: None,
                clerk_id: clerk_id.clone(),
                email: format!("{}@test.local", clerk_id),
                name: None,
                image: None,
                email_verified: None,
                is_active: true,
                last_login: None,
                liked_tools: vec![],
                saved_tools: vec![],
                folders: vec![],
                is_subscribed: false,
                plan_amount: 0,
                payment_history: vec![],
                created_at: Some(now),
                updated_at: Some(now),
            })
            .await
            .expect("insert user");

        let input = PaymentInput {
            payment_id: format!("pay_{}", uuid::Uuid::new_v4()),
            order_id: "order_test".to_string(),
            amount: 500,
            currency: "INR".to_string(),
            status: "captured".to_string(),
            plan_amount: 5,
            created_at: now,
        };

        // Duplicate webhook delivery: same payment twice, one increment
        let first = reconcile_payment(&db, &clerk_id, input.clone())
            .await
            .expect("first reconcile");
        assert_eq!(first, ReconcileOutcome::Applied);

        let second = reconcile_payment(&db, &clerk_id, input)
            .await
            .expect("second reconcile");
        assert_eq!(second, ReconcileOutcome::AlreadyRecorded);

        let user = users
            .find_one(doc! { "clerk_id": &clerk_id })
            .await
            .expect("query")
            .expect("user");
        assert_eq!(user.plan_amount, 5);
        assert_eq!(user.payment_history.len(), 1);
        assert!(user.is_subscribed);

        users
            .delete_one(doc! { "clerk_id": &clerk_id })
            .await
            .expect("cleanup");
    }
}
