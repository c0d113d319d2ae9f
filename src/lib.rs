//! A [Modbus](http://modbus.org/) TCP server built on
//! [Tokio](https://docs.rs/tokio) and Rust's `async/await` syntax.
//!
//! The server accepts client connections, frames Modbus TCP ADUs off the
//! stream, and dispatches each request to a user-supplied
//! [`server::RequestHandler`]. A configurable cap bounds the number of
//! concurrently connected clients, and [`server::Server::stop`] severs every
//! client deterministically.
//!
//! # Features
//!
//! * Panic-free parsing
//! * One task per connection, strict request/reply ordering per connection
//! * Strict admission control: above the cap, connections are closed without
//!   a protocol reply
//! * Structured logging via [tracing](https://docs.rs/tracing)
//!
//! # Supported Functions
//!
//! * Read Coils (0x01)
//! * Read Discrete Inputs (0x02)
//! * Read Holding Registers (0x03)
//! * Read Input Registers (0x04)
//! * Write Single Coil (0x05)
//! * Write Single Register (0x06)
//! * Write Multiple Coils (0x0F)
//! * Write Multiple Registers (0x10)
//!
//! Any other function code is answered with an *Illegal Function* exception.
//!
//! # Example
//!
//! A server exposing ten coils on any unit id:
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//!
//! use tokio::net::TcpListener;
//!
//! use mbserv::server::{CoilsRequest, RequestHandler, ServerBuilder};
//! use mbserv::ExceptionCode;
//!
//! struct CoilsOnlyHandler {
//!     coils: Mutex<[bool; 10]>,
//! }
//!
//! impl RequestHandler for CoilsOnlyHandler {
//!     fn handle_coils(&self, request: CoilsRequest) -> Result<Vec<bool>, ExceptionCode> {
//!         let mut coils = self.coils.lock().unwrap();
//!         let window = request.range.to_std_range();
//!         if window.end > coils.len() {
//!             return Err(ExceptionCode::IllegalDataAddress);
//!         }
//!         if request.is_write {
//!             coils[window.clone()].copy_from_slice(request.args);
//!         }
//!         Ok(coils[window].to_vec())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = Arc::new(CoilsOnlyHandler {
//!         coils: Mutex::new([false; 10]),
//!     });
//!
//!     let server = ServerBuilder::new(handler).max_clients(16).build()?;
//!
//!     let listener = TcpListener::bind("127.0.0.1:502").await?;
//!     server.start(listener)?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

#![deny(
    non_camel_case_types,
    non_shorthand_field_patterns,
    non_snake_case,
    non_upper_case_globals,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unreachable_pub,
    unused_comparisons,
    unused_import_braces,
    unused_qualifications,
    clippy::all
)]
#![forbid(unsafe_code, while_true, bare_trait_objects)]

/// public constant values related to the Modbus specification
pub mod constants;
/// error types produced by the server
pub mod error;
/// server API
pub mod server;

// internal modules
mod common;
mod exception;
mod tcp;
mod types;

pub use exception::ExceptionCode;
pub use types::{AddressRange, Indexed, UnitId};
