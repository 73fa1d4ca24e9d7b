pub mod auth;
pub mod clock;
pub mod configuration;
pub mod error;
pub mod identity;
pub mod sanitizer;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod validators;
