//! Persistence for accounts and password reset tokens

pub mod user;

pub use user::{DuplicateEmail, IdentityStore, UserRepository};

#[cfg(test)]
pub use user::memory::MemoryIdentityStore;
