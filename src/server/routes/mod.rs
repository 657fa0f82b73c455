pub mod basic;
pub mod messages;
