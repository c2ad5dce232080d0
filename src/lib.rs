pub mod app;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use handlers::*;

pub use app::state::AppState;

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(metrics::health))
        .route("/checkout/orders", post(checkout::create_order))
        .route("/checkout/return", get(checkout::checkout_return))
        .route("/checkout/cancel", get(checkout::checkout_cancel))
        .route("/checkout/charge", post(checkout::charge))
        .route("/purchases", get(purchases::list_purchases))
        .route("/purchases/:film_id", get(purchases::has_purchased))
        .route(
            "/progress/:film_id",
            get(progress::get_progress)
                .put(progress::save_progress)
                .delete(progress::reset_progress),
        )
        .route("/metrics", get(metrics::get_metrics));

    // only a sandbox deployment gets the fake approval page
    if state.sandbox.is_some() {
        router = router.route("/sandbox/approve", get(checkout::sandbox_approve));
    }

    router.with_state(state)
}
