pub mod acquisition;
pub mod connection;
pub mod features;
