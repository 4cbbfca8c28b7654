use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/documents", document_routes(config))
        .nest("/maintenance", maintenance_routes())
}

fn document_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::document::list_documents,
            handlers::document::create_document
        ))
        .routes(routes!(
            handlers::document::get_document,
            handlers::document::replace_document,
            handlers::document::update_document,
            handlers::document::delete_document
        ))
        .routes(routes!(handlers::document::download_document))
        .layer(handlers::document::upload_body_limit(
            config.storage.max_blob_size,
        ))
}

fn maintenance_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::maintenance::reconcile_now))
}
