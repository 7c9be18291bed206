pub mod alignment;
pub mod summary;
