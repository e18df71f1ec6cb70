pub mod board;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod rest;
pub mod routes;
pub mod state;
pub mod storage;
pub mod viewers;
