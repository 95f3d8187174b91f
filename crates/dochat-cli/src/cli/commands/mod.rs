pub mod chat;
pub mod docs;
