pub mod document;
pub mod pagination;
pub mod project;
pub mod report;
pub mod role;
pub mod user;
