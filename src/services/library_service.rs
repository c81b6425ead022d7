// ==================== USER LIBRARY (LIKES, SAVES, FOLDERS) ====================
// Saved lists and folders hold name snapshots of the tool; liked lists hold
// ids. Tool documents carry denormalized like/save counters kept in step with
// the user-side mutations.

use crate::database::MongoDB;
use crate::models::{
    Folder, SavedTool, Tool, User, MAX_FOLDER_NAME_LENGTH, MAX_SAVED_TOOLS, MAX_TOOLS_PER_FOLDER,
};
use crate::services::subscription_service::{folder_limit, tool_limit};
use crate::services::tool_service::find_tool;
use crate::utils::error::AppError;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use mongodb::options::ReturnDocument;
use serde::Serialize;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LikeStatus {
    pub success: bool,
    pub like_count: i64,
    pub has_liked: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SaveStatus {
    pub success: bool,
    pub save_count: i64,
    pub has_saved: bool,
}

async fn find_user(db: &MongoDB, clerk_id: &str) -> Result<User, AppError> {
    db.collection::<User>("users")
        .find_one(doc! { "clerk_id": clerk_id })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

fn snapshot(tool: &Tool) -> SavedTool {
    SavedTool {
        name: tool.title.clone(),
        logo_url: tool.logo_url.clone(),
        website_url: tool.website_url.clone(),
        description: Some(tool.about.chars().take(200).collect()),
        category: Some(tool.category.clone()),
        saved_at: BsonDateTime::now(),
    }
}

/// Applies a like/save counter delta on the tool and returns the new value
async fn bump_counter(
    db_tools: &MongoDB,
    tool_id: &ObjectId,
    field: &str,
    delta: i64,
) -> Result<i64, AppError> {
    let tools = db_tools.collection::<Tool>("tools");
    let updated = tools
        .find_one_and_update(doc! { "_id": tool_id }, doc! { "$inc": { field: delta } })
        .return_document(ReturnDocument::After)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Tool".to_string()))?;
    Ok(match field {
        "like_count" => updated.like_count,
        _ => updated.save_count,
    })
}

// ==================== LIKES ====================

pub async fn like_status(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<LikeStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;
    Ok(LikeStatus {
        success: true,
        like_count: tool.like_count,
        has_liked: user.has_liked(tool_id),
    })
}

pub async fn like_tool(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<LikeStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;

    if user.has_liked(tool_id) {
        log::info!("👍 {} already liked {}, skipping", clerk_id, tool.title);
        return Ok(LikeStatus {
            success: true,
            like_count: tool.like_count,
            has_liked: true,
        });
    }

    let like_count = bump_counter(db_tools, tool_id, "like_count", 1).await?;

    db_users
        .collection::<User>("users")
        .update_one(
            doc! { "clerk_id": clerk_id },
            doc! { "$addToSet": { "liked_tools": tool_id } },
        )
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    log::info!("👍 {} liked {}", clerk_id, tool.title);
    Ok(LikeStatus {
        success: true,
        like_count,
        has_liked: true,
    })
}

pub async fn unlike_tool(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<LikeStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;

    if !user.has_liked(tool_id) {
        return Ok(LikeStatus {
            success: true,
            like_count: tool.like_count,
            has_liked: false,
        });
    }

    let like_count = bump_counter(db_tools, tool_id, "like_count", -1).await?;

    db_users
        .collection::<User>("users")
        .update_one(
            doc! { "clerk_id": clerk_id },
            doc! { "$pull": { "liked_tools": tool_id } },
        )
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    log::info!("👎 {} unliked {}", clerk_id, tool.title);
    Ok(LikeStatus {
        success: true,
        like_count,
        has_liked: false,
    })
}

// ==================== SAVES ====================

pub async fn save_status(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<SaveStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;
    Ok(SaveStatus {
        success: true,
        save_count: tool.save_count,
        has_saved: user.has_saved(&tool.title),
    })
}

pub async fn save_tool(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<SaveStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;

    if user.has_saved(&tool.title) {
        return Ok(SaveStatus {
            success: true,
            save_count: tool.save_count,
            has_saved: true,
        });
    }

    let limit = tool_limit(user.plan_amount).min(MAX_SAVED_TOOLS as i64);
    if (user.total_saved() as i64) >= limit {
        return Err(AppError::ValidationError(format!(
            "Tool limit reached. You can only save {} tools; you currently have {}.",
            limit,
            user.total_saved()
        )));
    }

    let entry =
        to_bson(&snapshot(&tool)).map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;
    db_users
        .collection::<User>("users")
        .update_one(
            doc! { "clerk_id": clerk_id },
            doc! { "$push": { "saved_tools": entry } },
        )
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    let save_count = bump_counter(db_tools, tool_id, "save_count", 1).await?;

    log::info!("💾 {} saved {}", clerk_id, tool.title);
    Ok(SaveStatus {
        success: true,
        save_count,
        has_saved: true,
    })
}

pub async fn unsave_tool(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    tool_id: &ObjectId,
) -> Result<SaveStatus, AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;

    if !user.has_saved(&tool.title) {
        return Ok(SaveStatus {
            success: true,
            save_count: tool.save_count,
            has_saved: false,
        });
    }

    // Remove from the unsorted list and from every folder holding it
    let mut update = doc! { "$pull": { "saved_tools": { "name": &tool.title } } };
    let mut set = mongodb::bson::Document::new();
    for (index, folder) in user.folders.iter().enumerate() {
        if folder.tools.iter().any(|t| t.name == tool.title) {
            let remaining: Vec<_> = folder
                .tools
                .iter()
                .filter(|t| t.name != tool.title)
                .cloned()
                .collect();
            let remaining_bson = to_bson(&remaining)
                .map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;
            set.insert(format!("folders.{}.tools", index), remaining_bson);
        }
    }
    if !set.is_empty() {
        update.insert("$set", set);
    }

    db_users
        .collection::<User>("users")
        .update_one(doc! { "clerk_id": clerk_id }, update)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    let save_count = bump_counter(db_tools, tool_id, "save_count", -1).await?;

    log::info!("🧹 {} unsaved {}", clerk_id, tool.title);
    Ok(SaveStatus {
        success: true,
        save_count,
        has_saved: false,
    })
}

// ==================== FOLDERS ====================

pub async fn create_folder(
    db_users: &MongoDB,
    clerk_id: &str,
    name: &str,
) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_FOLDER_NAME_LENGTH {
        return Err(AppError::ValidationError(
            "Folder name is required and cannot exceed 100 characters".to_string(),
        ));
    }

    let user = find_user(db_users, clerk_id).await?;

    if user.folder(name).is_some() {
        return Err(AppError::ValidationError(format!(
            "Folder '{}' already exists",
            name
        )));
    }

    let limit = folder_limit(user.plan_amount);
    if (user.folders.len() as i64) >= limit {
        return Err(AppError::ValidationError(format!(
            "Folder limit reached. You can only create {} folders.",
            limit
        )));
    }

    let folder = Folder {
        name: name.to_string(),
        tools: vec![],
        created_at: BsonDateTime::now(),
    };
    let folder_bson =
        to_bson(&folder).map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;

    db_users
        .collection::<User>("users")
        .update_one(
            doc! { "clerk_id": clerk_id },
            doc! { "$push": { "folders": folder_bson } },
        )
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    log::info!("📁 {} created folder {}", clerk_id, name);
    Ok(())
}

pub async fn add_tool_to_folder(
    db_tools: &MongoDB,
    db_users: &MongoDB,
    clerk_id: &str,
    folder_name: &str,
    tool_id: &ObjectId,
) -> Result<(), AppError> {
    let tool = find_tool(db_tools, tool_id).await?;
    let user = find_user(db_users, clerk_id).await?;

    let (index, folder) = user
        .folders
        .iter()
        .enumerate()
        .find(|(_, f)| f.name == folder_name)
        .ok_or_else(|| AppError::NotFound("Folder".to_string()))?;

    if folder.tools.iter().any(|t| t.name == tool.title) {
        return Err(AppError::ValidationError(format!(
            "'{}' is already in folder '{}'",
            tool.title, folder_name
        )));
    }

    if folder.tools.len() >= MAX_TOOLS_PER_FOLDER {
        return Err(AppError::ValidationError(format!(
            "Folder '{}' is full (maximum {} tools)",
            folder_name, MAX_TOOLS_PER_FOLDER
        )));
    }

    let limit = tool_limit(user.plan_amount);
    if (user.total_saved() as i64) >= limit {
        return Err(AppError::ValidationError(format!(
            "Tool limit reached. You can only save {} tools.",
            limit
        )));
    }

    let entry =
        to_bson(&snapshot(&tool)).map_err(|e| AppError::InternalError(format!("bson: {}", e)))?;
    let mut push = mongodb::bson::Document::new();
    push.insert(format!("folders.{}.tools", index), entry);

    db_users
        .collection::<User>("users")
        .update_one(doc! { "clerk_id": clerk_id }, doc! { "$push": push })
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    log::info!("📁 {} filed {} into {}", clerk_id, tool.title, folder_name);
    Ok(())
}
