pub mod api;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod external;
pub mod fare;
pub mod geometry;
pub mod otp;
pub mod server;
