pub mod algotester;
pub mod auth;
pub mod broadcaster;
pub mod config;
pub mod contest_package;
pub mod models;
pub mod poller;
pub mod reconcile;
pub mod routes;
pub mod state;
