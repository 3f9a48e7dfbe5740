//! Nodes that bring data into a pipeline from counters, files, or sockets

pub mod number_generator;
pub mod udp_in;

pub use number_generator::NumberGeneratorNode;
pub use udp_in::UdpInNode;
