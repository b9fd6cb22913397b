//! Alert-noise suppression.
//!
//! [`AlertGate`] keeps a rolling 24 hour window of alert occurrences and says,
//! for each new occurrence, whether the notification should be silenced. The
//! gate never fails and never calls back into its caller.

pub mod clock;
pub mod gate;

pub use clock::*;
pub use gate::*;
