// ==================== TOOL CATALOG & OWNERSHIP CLEANUP ====================
// Deleting a tool fans out over every referencing user first and removes the
// tool document only after all user updates settle, so no user-facing list
// ever shows a ghost entry. Saved lists and folders key entries by name
// snapshot; liked lists key by id.

use crate::database::MongoDB;
use crate::models::{Tool, ToolUpload, User};
use crate::utils::error::AppError;
use futures::future::join_all;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Document};
use serde::Serialize;

pub fn parse_tool_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::ValidationError("Invalid tool id".to_string()))
}

pub async fn find_tool(db: &MongoDB, tool_id: &ObjectId) -> Result<Tool, AppError> {
    let tools = db.collection::<Tool>("tools");
    tools
        .find_one(doc! { "_id": tool_id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Tool".to_string()))
}

// ==================== CASCADING DELETE ====================

/// Filter for every user holding any reference to the tool: liked by id,
/// saved or foldered by title snapshot
pub(crate) fn build_reference_filter(tool_id: &ObjectId, title: &str) -> Document {
    doc! {
        "$or": [
            { "liked_tools": tool_id },
            { "saved_tools.name": title },
            { "folders.tools.name": title },
        ]
    }
}

/// One combined update per user: pull the like, pull the saved entry, and
/// rewrite each affected folder's tool list (folders are independent ordered
/// sub-lists, so each is replaced individually). None when nothing matches.
pub(crate) fn build_cleanup_update(
    user: &User,
    tool_id: &ObjectId,
    title: &str,
) -> Result<Option<Document>, AppError> {
    let mut pull = Document::new();
    let mut set = Document::new();

    if user.has_liked(tool_id) {
        pull.insert("liked_tools", tool_id);
    }

    if user.saved_tools.iter().any(|t| t.name == title) {
        pull.insert("saved_tools", doc! { "name": title });
    }

    for (index, folder) in user.folders.iter().enumerate() {
        if folder.tools.iter().any(|t| t.name == title) {
            let remaining: Vec<_> = folder
                .tools
                .iter()
                .filter(|t| t.name != title)
                .cloned()
                .collect();
            let remaining_bson =
                to_bson(&remaining).map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;
            set.insert(format!("folders.{}.tools", index), remaining_bson);
        }
    }

    if pull.is_empty() && set.is_empty() {
        return Ok(None);
    }

    let mut update = Document::new();
    if !pull.is_empty() {
        update.insert("$pull", pull);
    }
    if !set.is_empty() {
        update.insert("$set", set);
    }
    Ok(Some(update))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CascadeReport {
    pub cleaned_users: u64,
    pub failed_users: u64,
}

/// Removes the tool and every dangling reference to it. Per-user updates run
/// concurrently; a failing user is logged and counted without aborting the
/// cascade. The tool document is deleted only after the fan-out settles.
pub async fn delete_tool(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    tool_id: &ObjectId,
) -> Result<CascadeReport, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    log::info!("🗑️  Deleting tool: {} (ID: {})", tool.title, tool_id);

    let users = db_users.collection::<User>("users");
    let filter = build_reference_filter(tool_id, &tool.title);

    // Query failure aborts before any mutation
    let mut cursor = users
        .find(filter)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to query referencing users: {}", e)))?;

    let mut updates = Vec::new();
    while let Some(user) = cursor
        .try_next()
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to read referencing users: {}", e)))?
    {
        let user_id = match user.id {
            Some(id) => id,
            None => continue,
        };
        if let Some(update) = build_cleanup_update(&user, tool_id, &tool.title)? {
            let users = users.clone();
            updates.push(async move {
                users
                    .update_one(doc! { "_id": user_id }, update)
                    .await
                    .map(|_| ())
                    .map_err(|e| (user_id, e))
            });
        }
    }

    log::info!("👥 Found {} users referencing {}", updates.len(), tool.title);

    let results = join_all(updates).await;
    let mut cleaned_users = 0u64;
    let mut failed_users = 0u64;
    for result in results {
        match result {
            Ok(()) => cleaned_users += 1,
            Err((user_id, e)) => {
                failed_users += 1;
                log::error!("❌ Cleanup failed for user {}: {}", user_id, e);
            }
        }
    }

    if failed_users > 0 {
        log::warn!(
            "⚠️  Cascade for {} finished with {} failed user updates",
            tool.title,
            failed_users
        );
    }

    // Delete the tool only after all user updates settled. If this fails the
    // tool remains but is unreferenced; a retry of the whole cascade heals it.
    let tools = db_tools.collection::<Tool>("tools");
    tools.delete_one(doc! { "_id": tool_id }).await.map_err(|e| {
        AppError::InternalError(format!(
            "User cleanup succeeded but tool deletion failed (retry is safe): {}",
            e
        ))
    })?;

    log::info!(
        "✅ Deleted {} and cleaned up {} user records",
        tool.title,
        cleaned_users
    );

    Ok(CascadeReport {
        cleaned_users,
        failed_users,
    })
}

// ==================== BULK UPLOAD ====================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadReport {
    pub inserted_count: usize,
    pub skipped: Vec<String>,
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == 11000
    )
}

/// Validates every item up front, then inserts one by one so a duplicate
/// title skips that item instead of failing the batch.
pub async fn upload_tools(db: &MongoDB, items: Vec<ToolUpload>) -> Result<UploadReport, AppError> {
    if items.is_empty() {
        return Err(AppError::ValidationError(
            "Data must be a non-empty array of tools".to_string(),
        ));
    }

    let mut validated = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item.into_tool() {
            Ok(tool) => validated.push(tool),
            Err(errors) => {
                return Err(AppError::ValidationError(format!(
                    "Tool {} validation failed: {}",
                    index + 1,
                    errors.join(", ")
                )))
            }
        }
    }

    let tools = db.collection::<Tool>("tools");
    let mut inserted_count = 0;
    let mut skipped = Vec::new();

    for tool in validated {
        let title = tool.title.clone();
        match tools.insert_one(tool).await {
            Ok(_) => {
                inserted_count += 1;
                log::info!("📦 Created tool: {}", title);
            }
            Err(e) if is_duplicate_key_error(&e) => {
                log::warn!("⚠️  Tool title already exists, skipping: {}", title);
                skipped.push(title);
            }
            Err(e) => {
                return Err(AppError::DatabaseError(format!(
                    "Failed to create tool {}: {}",
                    title, e
                )))
            }
        }
    }

    Ok(UploadReport {
        inserted_count,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Folder, SavedTool};
    use mongodb::bson::DateTime as BsonDateTime;

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

    fn user_with_references(tool_id: ObjectId, title: &str) -> User {
        User {
            id: Some(ObjectId::new()),
            clerk_id: "user_1".to_string(),
            email: "a@b.com".to_string(),
            name: None,
            image: None,
            email_verified: None,
            is_active: true,
            last_login: None,
            liked_tools: vec![tool_id, ObjectId::new()],
            saved_tools: vec![saved(title), saved("Keeper")],
            folders: vec![
                Folder {
                    name: "Work".to_string(),
                    tools: vec![saved(title), saved("Keeper")],
                    created_at: BsonDateTime::now(),
                },
                Folder {
                    name: "Play".to_string(),
                    tools: vec![saved("Other"), saved(title)],
                    created_at: BsonDateTime::now(),
                },
            ],
            is_subscribed: false,
            plan_amount: 0,
            payment_history: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_reference_filter_shape() {
        let id = ObjectId::new();
        let filter = build_reference_filter(&id, "Writer");
        let branches = filter.get_array("$or").expect("$or");
        assert_eq!(branches.len(), 3);
    }

    #[test]
    fn test_cleanup_update_covers_likes_saves_and_both_folders() {
        let tool_id = ObjectId::new();
        let user = user_with_references(tool_id, "Writer");

        let update = build_cleanup_update(&user, &tool_id, "Writer")
            .expect("build")
            .expect("references present");

        let pull = update.get_document("$pull").expect("$pull");
        assert_eq!(pull.get_object_id("liked_tools").unwrap(), tool_id);
        assert_eq!(
            pull.get_document("saved_tools").unwrap().get_str("name").unwrap(),
            "Writer"
        );

        // Tool sat in two different folders: both get rewritten, unaffected
        // entries preserved in order
        let set = update.get_document("$set").expect("$set");
        let work = set.get_array("folders.0.tools").expect("folder 0");
        assert_eq!(work.len(), 1);
        let play = set.get_array("folders.1.tools").expect("folder 1");
        assert_eq!(play.len(), 1);

        let work_first = work[0].as_document().unwrap().get_str("name").unwrap();
        assert_eq!(work_first, "Keeper");
        let play_first = play[0].as_document().unwrap().get_str("name").unwrap();
        assert_eq!(play_first, "Other");
    }

    #[test]
    fn test_cleanup_update_untouched_user_is_none() {
        let tool_id = ObjectId::new();
        let mut user = user_with_references(ObjectId::new(), "Elsewhere");
        user.saved_tools = vec![saved("Keeper")];
        user.folders.clear();

        let update = build_cleanup_update(&user, &tool_id, "Writer").expect("build");
        assert!(update.is_none());
    }

    #[test]
    fn test_cleanup_update_like_only() {
        let tool_id = ObjectId::new();
        let mut user = user_with_references(tool_id, "Elsewhere");
        user.saved_tools.clear();
        user.folders.clear();

        let update = build_cleanup_update(&user, &tool_id, "Writer")
            .expect("build")
            .expect("like reference present");
        assert!(update.contains_key("$pull"));
        assert!(!update.contains_key("$set"));
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_cascade_delete_removes_all_references() {
        dotenv::dotenv().ok();
        let tools_cache = crate::database::ConnectionCache::new(
            "tools",
            "aitools_test",
            crate::database::MongoConfig::from_env("MONGODB_URI_TOOLS"),
        );
        let users_cache = crate::database::ConnectionCache::new(
            "users",
            "aitools_users_test",
            crate::database::MongoConfig::from_env("MONGODB_URI_USERS"),
        );
        let db_tools = tools_cache.connect().await.expect("tools connect");
        let db_users = users_cache.connect().await.expect("users connect");

        let title = format!("Cascade Test {}", uuid::Uuid::new_v4());
        let now = BsonDateTime::now();
        let tools = db_tools.collection::<Tool>("tools");
        let insert = tools
            .insert_one(Tool {
                id: None,
                title: title.clone(),
                logo_url: "https://example.com/logo.png".to_string(),
                website_url: "https://example.com".to_string(),
                category: "Testing".to_string(),
                about: "Cascade test tool".to_string(),
                keywords: vec![
                    "ai".into(),
                    "test".into(),
                    "cascade".into(),
                    "delete".into(),
                    "tool".into(),
                ],
                tool_type: crate::models::ToolType::Browser,
                like_count: 1,
                save_count: 1,
                is_active: true,
                created_at: Some(now),
                updated_at: Some(now),
            })
            .await
            .expect("insert tool");
        let tool_id = insert.inserted_id.as_object_id().expect("tool id");

        let users = db_users.collection::<User>("users");
        let clerk_id = format!("user_cascade_{}", uuid::Uuid::new_v4());
        let mut user = user_with_references(tool_id, &title);
        user.id = None;
        user.clerk_id = clerk_id.clone();
        user.email = format!("{}@test.local", clerk_id);
        users.insert_one(user).await.expect("insert user");

        let report = delete_tool(&db_tools, &db_users, &tool_id)
            .await
            .expect("cascade");
        assert_eq!(report.cleaned_users, 1);
        assert_eq!(report.failed_users, 0);

        assert!(tools
            .find_one(doc! { "_id": tool_id })
            .await
            .expect("query")
            .is_none());

        let cleaned = users
            .find_one(doc! { "clerk_id": &clerk_id })
            .await
            .expect("query")
            .expect("user still exists");
        assert!(!cleaned.has_liked(&tool_id));
        assert!(!cleaned.has_saved(&title));
        // Unaffected entries survive with order preserved
        assert_eq!(cleaned.liked_tools.len(), 1);
        assert_eq!(cleaned.saved_tools.len(), 1);
        assert_eq!(cleaned.folders[0].tools[0].name, "Keeper");
        assert_eq!(cleaned.folders[1].tools[0].name, "Other");

        users
            .delete_one(doc! { "clerk_id": &clerk_id })
            .await
            .expect("cleanup");
    }
}
