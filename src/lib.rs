pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod model;
pub mod routes;
pub mod secured;
pub mod services;
pub mod state;
