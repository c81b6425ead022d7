mod api;
mod database;
mod middleware;
mod models;
mod razorpay;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::database::DbPool;
use crate::razorpay::RazorpayState;
use crate::utils::rate_limiter::RateLimiterRegistry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3002".to_string());

    log::info!("🚀 Starting AI Tools Service...");

    // Shared outbound HTTP client (gateway, AI provider, page fetches)
    let http = reqwest::Client::new();

    // Process-scoped state: connection caches, rate limiters, gateway wiring
    let pool = web::Data::new(DbPool::from_env());
    let registry = web::Data::new(RateLimiterRegistry::new());
    let gateway = web::Data::new(RazorpayState::from_env(http.clone()));
    let http_data = web::Data::new(http);

    // Warm up the stores; requests reconnect lazily if this fails
    match pool.tools_db().await {
        Ok(_) => log::info!("✅ Tools store connected"),
        Err(e) => log::warn!("⚠️  Tools store warm-up failed: {}", e),
    }
    match pool.users_db().await {
        Ok(_) => log::info!("✅ Users store connected"),
        Err(e) => log::warn!("⚠️  Users store warm-up failed: {}", e),
    }

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);

        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(pool.clone())
            .app_data(registry.clone())
            .app_data(gateway.clone())
            .app_data(http_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Users: mirrored identity records + activity tracking
            .service(
                web::scope("/api/v1/users")
                    .wrap(middleware::AuthMiddleware)
                    .service(
                        web::resource("/create")
                            .wrap(middleware::RateLimit::scoped("/api/v1/users/create"))
                            .route(web::post().to(api::users::create_user)),
                    ),
            )
            .service(
                web::scope("/api/v1/user")
                    .wrap(middleware::AuthMiddleware)
                    .route("/activity", web::post().to(api::users::update_activity))
                    // Subscription: order creation, client confirmation, status
                    .route("/subscription", web::get().to(api::subscription::get_subscription))
                    .route("/subscription", web::post().to(api::subscription::create_order))
                    .route(
                        "/subscription/verify",
                        web::post().to(api::subscription::verify_payment),
                    )
                    // Folders
                    .service(
                        web::scope("/folders")
                            .wrap(middleware::RateLimit::scoped("/api/v1/user/folders"))
                            .route("", web::post().to(api::folders::create_folder))
                            .route(
                                "/{name}/tools",
                                web::post().to(api::folders::add_tool_to_folder),
                            ),
                    ),
            )
            // Tool catalog: intake and cascading delete
            .service(
                web::scope("/api/v1/tools")
                    .route("/upload", web::post().to(api::tools::upload_tools))
                    .route("/{id}", web::delete().to(api::tools::delete_tool))
                    // Likes and saves require a session
                    .service(
                        web::scope("/{id}/like")
                            .wrap(middleware::AuthMiddleware)
                            .route("", web::get().to(api::tools::like_status))
                            .route("", web::post().to(api::tools::like_tool))
                            .route("", web::delete().to(api::tools::unlike_tool)),
                    )
                    .service(
                        web::scope("/{id}/save")
                            .wrap(middleware::AuthMiddleware)
                            .wrap(middleware::RateLimit::scoped("/api/v1/tools/{id}/save"))
                            .route("", web::get().to(api::tools::save_status))
                            .route("", web::post().to(api::tools::save_tool))
                            .route("", web::delete().to(api::tools::unsave_tool)),
                    ),
            )
            // AI metadata helpers for the upload form
            .service(
                web::scope("/api/v1/metadata")
                    .wrap(middleware::RateLimit::scoped("/api/v1/metadata"))
                    .route("/about", web::post().to(api::metadata::generate_about))
                    .route("/keywords", web::post().to(api::metadata::extract_keywords))
                    .route("/auto-fill", web::post().to(api::metadata::auto_fill)),
            )
            // Gateway-initiated deliveries (raw body, no session)
            .service(
                web::scope("/api/v1/webhooks")
                    .route("/razorpay", web::post().to(api::webhooks::razorpay_webhook)),
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
