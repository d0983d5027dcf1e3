pub mod application;
pub mod auth;
pub mod cas;
pub mod config;
pub mod errors;
pub mod git;
pub mod github;
pub mod manifest;
pub mod prompt;
pub mod pull;
pub mod staging;
pub mod submit;
pub mod ui;
pub mod upload;
pub mod workspace;
