// Stem player
// Controller, display snapshot and the session event loop

pub mod controller;
pub mod display;
pub mod session;
pub mod stem;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::StemPlayer;
pub use display::{PlayerView, StemView};
pub use session::{PlayerCommand, PlayerSession, SessionConfig, SessionHandle};
pub use stem::{Stem, StemMap};
