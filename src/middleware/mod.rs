pub mod auth;

pub use auth::{auth_middleware, is_admin, is_landlord_or_admin, is_tenant, AppState, AuthUser};
