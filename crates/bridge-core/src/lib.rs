//! bridge-core
//!
//! Transport-agnostic pieces of the engine bridge:
//! - response values returned by every engine operation
//! - engine identity (family, version, name) and the handshake reply parser
//! - the transport fault taxonomy and how each fault is handled
//! - the discovery / reconnect policy used by the poll loop

pub mod response;
pub mod engine_info;
pub mod error;
pub mod discovery;

pub use response::{Payload, Response};
pub use engine_info::{EngineFamily, EngineInfo, StatusEvent, VERSION_QUERY};
pub use error::{DiscoveryError, FaultClass, TransportError};
pub use discovery::{DiscoveryDecision, DiscoveryState};
