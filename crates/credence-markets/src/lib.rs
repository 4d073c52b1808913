//! credence-markets — Prediction-market catalogue search.

pub mod client;

pub use client::MarketClient;
