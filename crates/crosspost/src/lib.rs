pub mod api;
pub mod config;
pub mod content;
pub mod credentials;
pub mod db;
pub mod error;
pub mod jobs;
pub mod platforms;
pub mod telemetry;
