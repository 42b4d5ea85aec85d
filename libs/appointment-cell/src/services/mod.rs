pub mod booking;
pub mod conflict;
pub mod consistency;
pub mod directory;
pub mod lifecycle;
pub mod store;
pub mod supabase_store;
