pub mod auth;
pub mod cookies;
pub mod errors;
pub mod image_host;
pub mod password;
pub mod pin;
pub mod routes;
pub mod server;
pub mod setup;
pub mod state;
pub mod token;
pub mod user;
