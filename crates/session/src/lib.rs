//! WebUSB-style device sessions
//!
//! This crate keeps the set of attached devices, gates every operation on
//! them through a small state machine (open, configured, claimed) and runs
//! control, bulk and interrupt transfers through a platform [`Transport`].
//!
//! # Example
//!
//! ```
//! use protocol::{ControlSetup, Recipient, RequestType};
//! use session::test_utils::{MockDevice, MockTransport};
//! use session::Session;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), session::SessionError> {
//! let transport = Arc::new(MockTransport::new());
//! transport.add_device(MockDevice::new(1, 2));
//! let session = Session::new(transport);
//!
//! let handle = session.list_devices().await?[0].handle;
//! session.open(handle).await?;
//! session.claim_interface(handle, 0).await?;
//!
//! let setup = ControlSetup {
//!     request_type: RequestType::Vendor,
//!     recipient: Recipient::Interface,
//!     request: 0x01,
//!     value: 0,
//!     index: 0,
//! };
//! let result = session.control_transfer_in(handle, setup, 8).await?;
//! assert_eq!(result.data.len(), 8);
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod discovery;
pub mod error;
pub mod model;
mod registry;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transfers;
pub mod transport;

pub use error::{DiscoveryError, Missing, Operation, Result, SessionError, TransportError};
pub use model::{AlternateInterface, Configuration, Device, Endpoint, Interface};
pub use session::{DeviceEvent, Session, SessionOptions};
pub use transfers::{InTransferResult, OutTransferResult, TransferStatus};
pub use transport::{Transport, TransportEvent, TransportResult};
