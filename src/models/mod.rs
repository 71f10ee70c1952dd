pub mod chat;
pub mod friend;
pub mod trip;
pub mod user;
