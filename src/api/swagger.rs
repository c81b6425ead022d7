use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AI Tools Directory API",
        version = "1.0.0",
        description = "Backend API for the AI tools directory. \n\n**Authentication:** User-scoped endpoints require a Bearer session token.\n\n**Features:**\n- Tool catalog intake with AI-assisted metadata\n- Likes, saves, and folders per user\n- Subscription billing via Razorpay with webhook reconciliation\n- Health monitoring",
    ),
    paths(
        // Health
        crate::api::health::health_check,

        // Users
        crate::api::users::create_user,

        // Subscription
        crate::api::subscription::get_subscription,
        crate::api::subscription::create_order,
        crate::api::subscription::verify_payment,

        // Tools
        crate::api::tools::upload_tools,
        crate::api::tools::delete_tool,
        crate::api::tools::like_tool,

        // Metadata
        crate::api::metadata::generate_about,
        crate::api::metadata::extract_keywords,
        crate::api::metadata::auto_fill,
    ),
    components(
        schemas(
            crate::api::health::HealthResponse,
            crate::api::subscription::CreateOrderRequest,
            crate::api::subscription::VerifyPaymentRequest,
            crate::api::metadata::AboutRequest,
            crate::api::metadata::WebsiteRequest,
            crate::models::ToolUpload,
            crate::models::ToolType,
            crate::services::subscription_service::SubscriptionStatus,
            crate::services::subscription_service::CreatedOrder,
            crate::services::tool_service::CascadeReport,
            crate::services::tool_service::UploadReport,
            crate::services::library_service::LikeStatus,
            crate::services::metadata_service::ExtractedKeywords,
            crate::services::metadata_service::AutoFillMetadata,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints for monitoring service status."),
        (name = "Users", description = "Local user records mirrored from the identity provider."),
        (name = "Subscription", description = "Subscription orders, payment verification, and derived entitlements."),
        (name = "Tools", description = "Tool catalog intake, likes/saves, and cascading deletion."),
        (name = "Metadata", description = "AI-assisted metadata generation for the upload form."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Identity provider session token"))
                        .build(),
                ),
            );
        }
    }
}
