pub mod auth;
pub mod leases;
pub mod maintenance;
pub mod messages;
pub mod payments;
pub mod properties;
pub mod users;

use crate::middleware::AppState;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/users", users::routes())
        .nest("/properties", properties::routes())
        .nest("/leases", leases::routes())
        .nest("/payments", payments::routes())
        .nest("/maintenance", maintenance::routes())
        .nest("/messages", messages::routes())
}
