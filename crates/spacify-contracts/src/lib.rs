pub mod api;
pub mod catalog;
pub mod events;
pub mod projects;
pub mod receipts;
