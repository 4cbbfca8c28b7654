pub mod document;
pub mod maintenance;
