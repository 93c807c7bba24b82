pub mod accounting;
pub mod data;
