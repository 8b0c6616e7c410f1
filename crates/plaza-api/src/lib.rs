//! Plaza HTTP API: routing, authentication middleware, the post access
//! policy and the handlers.

pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod policy;
pub mod posts;
pub mod state;
pub mod users;
pub mod validate;

use std::time::Duration;

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    middleware as mw,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Longest a single request may run before it is answered with a 504.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The complete application.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/authentication/users", post(auth::register_user))
        .route("/authentication/token", post(auth::create_token))
        .route("/users/activate/{token}", put(users::activate_user));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route_layer(mw::from_fn_with_state(state.clone(), middleware::basic_auth));

    let protected_routes = Router::new()
        .route("/users/feed", get(users::get_feed))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/follow", put(users::follow_user))
        .route("/users/{id}/unfollow", put(users::unfollow_user))
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/comments", post(comments::create_comment))
        .route_layer(mw::from_fn_with_state(state.clone(), middleware::require_auth));

    let app = Router::new()
        .merge(public_routes)
        .merge(health_routes)
        .merge(protected_routes)
        .fallback(|| async { ApiError::NotFound("route not found") })
        .method_not_allowed_fallback(|| async { ApiError::MethodNotAllowed })
        .with_state(state);

    with_middleware(app, REQUEST_TIMEOUT)
}

/// Request-wide layers, innermost first: panic recovery, the deadline,
/// error logging, then request ids, CORS and tracing around everything.
pub fn with_middleware(app: Router, timeout: Duration) -> Router {
    app.layer(CatchPanicLayer::custom(error::panic_response))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(error::handle_timeout))
                .timeout(timeout),
        )
        .layer(mw::from_fn(error::log_errors))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
