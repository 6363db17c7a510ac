pub mod actor;
pub mod order;
pub mod withdrawal;
