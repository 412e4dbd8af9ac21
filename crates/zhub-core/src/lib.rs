//! zhub Core
//!
//! Datatypes, cluster schema and the schema-driven codec behind the zhub
//! Zigbee gateway. Everything here is synchronous and free of I/O; a loaded
//! [`ClusterDb`] is immutable and can be shared across threads.
//!
//! This crate provides:
//! - The ZCL scalar datatype table ([`DataType`]) and its wire rules ([`scalar`])
//! - The type algebra used by schemas ([`AnyType`], [`ObjectType`])
//! - The dynamic decoder/encoder over that algebra ([`codec`])
//! - Cluster/attribute/command tables loaded from INFO text ([`ClusterDb`])
//! - ZCL frame headers ([`ZclFrame`]) and the Xiaomi heartbeat attribute ([`xiaomi`])

pub mod codec;
pub mod datatype;
pub mod error;
pub mod float;
pub mod frame;
pub mod info;
pub mod scalar;
pub mod schema;
pub mod searchable;
pub mod types;
pub mod value;
pub mod xiaomi;

pub use codec::{decode, decode_all, encode, encode_to_bytes, Context};
pub use datatype::{DataType, SizeClass};
pub use error::{Error, ErrorKind, Result};
pub use frame::{Direction, FrameType, ZclFrame, ZclHeader};
pub use schema::{AttributeInfo, ClusterDb, ClusterInfo, CommandInfo};
pub use searchable::{Keyed, SearchableList};
pub use types::{AnyType, ObjectEntry, ObjectType, STATUS_KEY, VALUE_KEY};
pub use value::{Map, Value};

/// Global command: Report attributes
pub const REPORT_ATTRIBUTES: u8 = 0x0a;
