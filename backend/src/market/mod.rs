pub mod collector;
pub mod meteora;
pub mod types;
