//! Request handlers that need more than a single function.

pub mod websocket;

pub use websocket::websocket_handler;
