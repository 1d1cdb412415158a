pub mod admin;

pub use admin::{admin_guard_layer, AdminGuard};
