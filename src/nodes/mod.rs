//! Built-in node library
//!
//! Node types register themselves with the global registry at link time;
//! the module a node is defined in determines its category (`loaders`,
//! `sources`, `processors`, `modifiers`, `exporters`).

pub mod exporters;
pub mod loaders;
pub mod modifiers;
pub mod processors;
pub mod sources;
