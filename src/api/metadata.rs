use crate::services::metadata_service::{self, AutoFillMetadata, ExtractedKeywords};
use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AboutRequest {
    pub description: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/metadata/about",
    tag = "Metadata",
    request_body = AboutRequest,
    responses(
        (status = 200, description = "Expanded about text"),
        (status = 400, description = "Description too short"),
        (status = 408, description = "AI provider timeout"),
        (status = 502, description = "AI provider failure")
    )
)]
pub async fn generate_about(
    http: web::Data<reqwest::Client>,
    request: web::Json<AboutRequest>,
) -> HttpResponse {
    match metadata_service::generate_about(&http, &request.description).await {
        Ok(about) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "about": about,
        })),
        Err(e) => {
            log::warn!("❌ About generation failed: {}", e);
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct WebsiteRequest {
    pub website_url: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/metadata/keywords",
    tag = "Metadata",
    request_body = WebsiteRequest,
    responses(
        (status = 200, description = "Extracted search keywords", body = ExtractedKeywords),
        (status = 400, description = "Invalid website URL"),
        (status = 408, description = "Website or AI provider timeout")
    )
)]
pub async fn extract_keywords(
    http: web::Data<reqwest::Client>,
    request: web::Json<WebsiteRequest>,
) -> HttpResponse {
    match metadata_service::extract_keywords(&http, &request.website_url).await {
        Ok(extracted) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "keywords": extracted.keywords,
        })),
        Err(e) => {
            log::warn!(
                "❌ Keyword extraction failed for {}: {}",
                request.website_url,
                e
            );
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/metadata/auto-fill",
    tag = "Metadata",
    request_body = WebsiteRequest,
    responses(
        (status = 200, description = "Title and logo extracted from the page", body = AutoFillMetadata),
        (status = 400, description = "Invalid website URL"),
        (status = 408, description = "Website timeout")
    )
)]
pub async fn auto_fill(
    http: web::Data<reqwest::Client>,
    request: web::Json<WebsiteRequest>,
) -> HttpResponse {
    match metadata_service::auto_fill_metadata(&http, &request.website_url).await {
        Ok(metadata) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "title": metadata.title,
            "logo_url": metadata.logo_url,
        })),
        Err(e) => {
            log::warn!("❌ Auto-fill failed for {}: {}", request.website_url, e);
            e.error_response()
        }
    }
}
