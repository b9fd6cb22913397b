pub mod report;
pub mod sink;

pub use report::*;
pub use sink::*;
