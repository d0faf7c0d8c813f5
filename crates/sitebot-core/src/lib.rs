pub mod action;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod interpreter;
pub mod mirror;
pub mod pending;
pub mod repo;
pub mod revalidate;
pub mod revert;
pub mod slug;
pub mod store;

pub use error::{Result, SiteError};
