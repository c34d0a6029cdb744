//! Waiver Backend
//!
//! Liability waiver templates with version history, organization merge fields,
//! guardian policy, write-once signing records and on-demand PDF documents.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod guardian;
pub mod merge;
pub mod models;
pub mod render;
pub mod signing;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Templates
        .route(
            "/templates",
            get(api::list_templates).post(api::create_template),
        )
        .route(
            "/templates/{id}",
            get(api::get_template)
                .put(api::update_template)
                .delete(api::delete_template),
        )
        .route(
            "/templates/{id}/versions",
            get(api::list_versions).post(api::create_version),
        )
        .route("/templates/{id}/resolve", post(api::resolve_template_content))
        .route("/templates/{id}/preview", post(api::preview_template))
        .route(
            "/templates/{id}/guardian-requirement",
            get(api::guardian_requirement),
        )
        .route("/template-versions/{id}", get(api::get_version))
        // Merge fields
        .route(
            "/merge-fields",
            get(api::list_merge_fields).post(api::create_merge_field),
        )
        .route(
            "/merge-fields/{id}",
            get(api::get_merge_field)
                .put(api::update_merge_field)
                .delete(api::delete_merge_field),
        )
        // Membership plans
        .route("/membership-plans/{plan_id}/waivers", get(api::list_plan_waivers))
        .route(
            "/membership-plans/{plan_id}/waivers/{template_id}",
            put(api::link_plan_waiver).delete(api::unlink_plan_waiver),
        )
        // Signed waivers
        .route("/signed-waivers", post(api::sign_waiver))
        .route("/signed-waivers/{id}", get(api::get_signed_waiver))
        .route(
            "/signed-waivers/{id}/document",
            get(api::download_signed_waiver),
        )
        .route(
            "/members/{member_id}/signed-waivers",
            get(api::list_member_signed_waivers),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
