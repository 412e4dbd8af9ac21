//! zhub transport layer
//!
//! Z-Stack Monitor and Test (ZNP) framing over a serial link:
//! - Frame encoding and a streaming decoder
//! - Request/response correlation and event fan-out
//! - The AF and UTIL payloads the gateway exchanges
//! - Serial backend (feature `serial`)

pub mod af;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod serial;
pub mod traits;

pub use af::{AfRegister, DataRequest, IncomingMsg};
pub use client::{run_reader, ZnpClient};
pub use dispatch::ZnpDispatcher;
pub use error::{Result, TransportError};
pub use frame::{CommandType, FrameDecoder, Subsystem, ZnpFrame};
pub use serial::{SerialConfig, SerialReceiver, SerialSender, SerialTransport};
pub use traits::{TransportEvent, TransportReceiver, TransportSender};
