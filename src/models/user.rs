use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

// Validation caps
pub const MAX_SAVED_TOOLS: usize = 200;
pub const MAX_TOOLS_PER_FOLDER: usize = 5;
pub const MAX_FOLDER_NAME_LENGTH: usize = 100;

/// Snapshot of a tool at save time; keyed by name in saved lists and folders
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SavedTool {
    pub name: String,
    pub logo_url: String,
    pub website_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub saved_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<SavedTool>,
    pub created_at: BsonDateTime,
}

/// Immutable once created; payment_id is the idempotency key
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentRecord {
    pub order_id: String,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub plan_amount: i64,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub clerk_id: String, // PRIMARY IDENTIFIER - external auth subject id
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub email_verified: Option<BsonDateTime>,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_login: Option<BsonDateTime>,
    #[serde(default)]
    pub liked_tools: Vec<ObjectId>,
    #[serde(default)]
    pub saved_tools: Vec<SavedTool>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub is_subscribed: bool,
    // Accumulated amount paid in whole dollars; never decreases outside
    // administrative action
    #[serde(default)]
    pub plan_amount: i64,
    #[serde(default)]
    pub payment_history: Vec<PaymentRecord>,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

fn default_is_active() -> bool {
    true
}

impl User {
    pub fn total_saved(&self) -> usize {
        let in_folders: usize = self.folders.iter().map(|f| f.tools.len()).sum();
        self.saved_tools.len() + in_folders
    }

    pub fn has_liked(&self, tool_id: &ObjectId) -> bool {
        self.liked_tools.iter().any(|id| id == tool_id)
    }

    pub fn has_saved(&self, tool_title: &str) -> bool {
        self.saved_tools.iter().any(|t| t.name == tool_title)
            || self
                .folders
                .iter()
                .any(|f| f.tools.iter().any(|t| t.name == tool_title))
    }

    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.payment_history
            .iter()
            .any(|p| p.payment_id == payment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(name: &str) -> SavedTool {
        SavedTool {
            name: name.to_string(),
            logo_url: "https://example.com/logo.png".to_string(),
            website_url: "https://example.com".to_string(),
            description: None,
            category: None,
            saved_at: BsonDateTime::now(),
        }
    }

    fn test_user() -> User {
        User {
            id: Some(ObjectId::new()),
            clerk_id: "user_2abc".to_string(),
            email: "a@b.com".to_string(),
            name: None,
            image: None,
            email_verified: None,
            is_active: true,
            last_login: None,
            liked_tools: vec![],
            saved_tools: vec![saved("Writer"), saved("Painter")],
            folders: vec![Folder {
                name: "Work".to_string(),
                tools: vec![saved("Coder")],
                created_at: BsonDateTime::now(),
            }],
            is_subscribed: false,
            plan_amount: 0,
            payment_history: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_total_saved_counts_folders() {
        assert_eq!(test_user().total_saved(), 3);
    }

    #[test]
    fn test_has_saved_checks_folders_too() {
        let user = test_user();
        assert!(user.has_saved("Writer"));
        assert!(user.has_saved("Coder"));
        assert!(!user.has_saved("Ghost"));
    }

    #[test]
    fn test_deserializes_with_missing_optional_fields() {
        let doc = mongodb::bson::doc! {
            "clerk_id": "user_1",
            "email": "x@y.com",
        };
        let user: User = mongodb::bson::from_document(doc).expect("deserialize");
        assert!(user.is_active);
        assert_eq!(user.plan_amount, 0);
        assert!(user.liked_tools.is_empty());
        assert!(user.payment_history.is_empty());
    }
}
