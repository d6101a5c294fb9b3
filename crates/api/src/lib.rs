//! HTTP surface: the request gate, the response envelope, and the resource
//! routes that sit behind them.

pub mod app;
pub mod config;
pub mod envelope;
pub mod gate;
pub mod mail;
pub mod mpesa;
pub mod validate;
