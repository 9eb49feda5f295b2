pub mod database;
pub mod member;
