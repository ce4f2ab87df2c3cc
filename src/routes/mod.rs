pub mod auth;
pub mod documents;
pub mod health;
pub mod projects;
pub mod reports;
pub mod roles;
pub mod users;
