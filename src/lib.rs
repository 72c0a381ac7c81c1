//! NUS console library
//! An interactive console for Bluetooth LE devices exposing the Nordic UART
//! Service: scan, connect, map RX/TX characteristics, and exchange text.

// Module declarations
pub mod commands;
pub mod config;
pub mod console;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
