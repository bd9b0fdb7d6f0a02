use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorResponse,
    routes::{health, returns},
    store::ReturnRecord,
    AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        returns::create_return,
        returns::get_return,
    ),
    components(
        schemas(
            health::HealthResponse,
            returns::CreateReturnRequest,
            ReturnRecord,
            ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "returns", description = "Return request endpoints, rate limited per client"),
    ),
    info(
        title = "Returns API",
        description = "Submit and retrieve return requests",
    ),
)]
pub struct ApiDoc;

pub fn create_swagger_router() -> Router<AppState> {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
