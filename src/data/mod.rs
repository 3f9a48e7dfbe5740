//! Core data model
//!
//! The typed envelope exchanged on channels ([`DataPacket`]), the payload
//! value model ([`Content`]), and the enumerated vocabularies every packet
//! is classified by.

pub mod content;
pub mod packet;
pub mod types;

pub use content::Content;
pub use packet::{DataPacket, PacketBuilder};
pub use types::{
    AcceptedKinds, DataCategory, DataFormat, DataSource, DataType, LifecycleState,
    SensitivityLevel,
};
