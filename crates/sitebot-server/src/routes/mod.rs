pub mod bot;
pub mod commits;
pub mod content;
