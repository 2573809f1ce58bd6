pub mod api;
pub mod backend;
pub mod classify;
pub mod collision;
pub mod config;
pub mod filter;
pub mod grid;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod poller;
pub mod selection;
pub mod session;
pub mod state;
