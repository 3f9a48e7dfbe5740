//! Value sources: constants, timers, and random emitters

pub mod constant;
pub mod random_number;
pub mod timer;

pub use constant::ConstantNode;
pub use random_number::RandomNumberNode;
pub use timer::TimerNode;
