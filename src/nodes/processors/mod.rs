//! Event-driven packet transforms

pub mod delay;
pub mod math_add;
pub mod math_multiply;
pub mod splitter;

pub use delay::DelayNode;
pub use math_add::MathAddNode;
pub use math_multiply::MathMultiplyNode;
pub use splitter::SplitterNode;
