//! Route configuration.

use crate::auth::admin_auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Registry and selector management (admin token when configured)
    let management_routes = Router::new()
        .route(
            "/v1/targets",
            put(handlers::register_targets).delete(handlers::delete_matching),
        )
        .route("/v1/targets/clean", delete(handlers::sweep_targets))
        .route(
            "/v1/targets/inventory/{key}/{value}",
            get(handlers::list_inventory),
        )
        .route(
            "/v1/targets/{id}",
            get(handlers::get_target)
                .post(handlers::update_target)
                .delete(handlers::delete_target),
        )
        .route("/v1/targets/name/{name}", delete(handlers::delete_by_name))
        .route(
            "/v1/targets/label/{key}/{value}",
            delete(handlers::delete_by_label),
        )
        .route(
            "/v1/selectors",
            get(handlers::list_selectors).post(handlers::rename_selector),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    // Scraper-facing routes stay open
    let scrape_routes = Router::new()
        .route(
            "/v1/targets/selector/{key}/{value}",
            get(handlers::discover_targets),
        )
        .route("/v1/proxy", get(handlers::proxy_scrape))
        .route("/v1/health", get(handlers::health_check));

    let mut router = Router::new().merge(management_routes).merge(scrape_routes);

    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
