// Server module entry point
// Binds the listener and serves connections with hyper

pub mod connection;
pub mod listener;
