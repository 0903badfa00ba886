//! Authentication service models

pub mod user;

pub use user::{NewUser, ResetToken, User, UserProfile};
