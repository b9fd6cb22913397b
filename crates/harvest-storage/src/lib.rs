pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use error::*;
pub use memory::*;
pub use query::*;
pub use traits::*;
