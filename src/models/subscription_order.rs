use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Order-to-buyer mapping written at order creation so the webhook handler
/// can resolve the paying user by order id instead of decoding the receipt
/// string positionally.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubscriptionOrder {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub order_id: String, // gateway order id, unique
    pub clerk_id: String,
    pub plan_amount: i64,
    pub receipt: String,
    pub created_at: BsonDateTime,
}
