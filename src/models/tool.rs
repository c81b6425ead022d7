use crate::utils::validators::{format_url, is_valid_category, is_valid_tool_title, is_valid_url};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

pub const MAX_ABOUT_LENGTH: usize = 5000;
pub const MIN_KEYWORDS: usize = 5;
pub const MAX_KEYWORDS: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Browser,
    Downloadable,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tool {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String, // unique across the catalog
    pub logo_url: String,
    pub website_url: String,
    pub category: String,
    pub about: String,
    pub keywords: Vec<String>,
    pub tool_type: ToolType,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub save_count: i64,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

fn default_is_active() -> bool {
    true
}

/// One item of the bulk upload payload
#[derive(Debug, Deserialize, Clone, utoipa::ToSchema)]
pub struct ToolUpload {
    pub title: String,
    pub logo_url: String,
    pub website_url: String,
    pub category: String,
    pub about: String,
    pub keywords: Vec<String>,
    pub tool_type: ToolType,
}

impl ToolUpload {
    /// Validates and normalizes into a catalog document
    pub fn into_tool(self) -> Result<Tool, Vec<String>> {
        let mut errors = Vec::new();

        let title = self.title.trim().to_string();
        if !is_valid_tool_title(&title) {
            errors.push("Tool title is required and may only contain letters, numbers, spaces, and common punctuation".to_string());
        }

        let logo_url = format_url(&self.logo_url);
        if !is_valid_url(&logo_url) {
            errors.push("Logo URL is required and must be a valid URL".to_string());
        }

        let website_url = format_url(&self.website_url);
        if !is_valid_url(&website_url) {
            errors.push("Website URL is required and must be a valid URL".to_string());
        }

        let category = self.category.trim().to_string();
        if !is_valid_category(&category) {
            errors.push("Category is required and may only contain letters, numbers, spaces, or hyphens".to_string());
        }

        let about = self.about.trim().to_string();
        if about.is_empty() || about.len() > MAX_ABOUT_LENGTH {
            errors.push(format!(
                "About text is required and cannot exceed {} characters",
                MAX_ABOUT_LENGTH
            ));
        }

        if self.keywords.len() < MIN_KEYWORDS || self.keywords.len() > MAX_KEYWORDS {
            errors.push(format!(
                "Keywords must be between {} and {} items",
                MIN_KEYWORDS, MAX_KEYWORDS
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let now = BsonDateTime::now();
        Ok(Tool {
            id: None,
            title,
            logo_url,
            website_url,
            category,
            about,
            keywords: self.keywords,
            tool_type: self.tool_type,
            like_count: 0,
            save_count: 0,
            is_active: true,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> ToolUpload {
        ToolUpload {
            title: "Notion AI".to_string(),
            logo_url: "https://example.com/logo.png".to_string(),
            website_url: "example.com".to_string(),
            category: "Productivity".to_string(),
            about: "An AI writing assistant built into Notion.".to_string(),
            keywords: vec![
                "ai".into(),
                "notes".into(),
                "writing".into(),
                "productivity".into(),
                "assistant".into(),
            ],
            tool_type: ToolType::Browser,
        }
    }

    #[test]
    fn test_valid_upload_normalizes_urls() {
        let tool = upload().into_tool().expect("valid upload");
        assert_eq!(tool.website_url, "https://example.com");
        assert_eq!(tool.like_count, 0);
        assert_eq!(tool.save_count, 0);
        assert!(tool.is_active);
    }

    #[test]
    fn test_rejects_bad_keyword_count() {
        let mut bad = upload();
        bad.keywords = vec!["ai".into(), "tool".into()];
        let errors = bad.into_tool().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Keywords")));
    }

    #[test]
    fn test_rejects_invalid_title() {
        let mut bad = upload();
        bad.title = "Tool™".to_string();
        assert!(bad.into_tool().is_err());
    }

    #[test]
    fn test_tool_type_serializes_lowercase() {
        let json = serde_json::to_string(&ToolType::Downloadable).unwrap();
        assert_eq!(json, "\"downloadable\"");
    }
}
