//! Bluetooth Module
//!
//! Provides RFCOMM communication with a LEGO NXT brick.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         Brick                            │
//! │   (ports, power, drive helpers - public API)             │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌──────────────┐        ┌───────────┐
//!               │ NxtConnection│───────▶│ Protocol  │
//!               │ - requests   │        │ - opcodes │
//!               │ - replies    │        │ - codec   │
//!               └──────┬───────┘        └───────────┘
//!                      ▼
//!               ┌──────────────┐
//!               │  Transport   │
//!               │ - u16 length │
//!               │   framing    │
//!               │ - timeouts   │
//!               └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Direct/system command telegrams and reply decoding
//! - [`transport`] - Length-prefixed framing and the RFCOMM socket
//! - [`connection`] - Typed request/reply exchanges
//! - [`brick`] - The brick handle applications use
//! - [`keep_alive`] - Periodic keep-alive task

pub mod brick;
pub mod connection;
pub mod keep_alive;
pub mod protocol;
pub mod transport;

pub use brick::Brick;
pub use connection::ConnectionConfig;
pub use keep_alive::KeepAlive;
