use crate::stream;
use axum::routing::get;
use axum::Router;
use service::AppState;

pub fn init_router(app_state: AppState) -> Router {
    // Every path is a proxy target: the upstream URL is the request path and
    // query minus the leading slash.
    Router::new()
        .route("/", get(stream::handler::stream))
        .route("/*upstream", get(stream::handler::stream))
        .with_state(app_state)
}
