pub mod assemble;
pub mod db;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod session;
pub mod store;
