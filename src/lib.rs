// Core coordination logic for the find-the-impostor party game. The
// rendering layer sits on top of `Session` (intents in) and `LobbyView`
// (projections out); the shared state store sits below the `LobbyStore`
// seam.

pub mod error;
pub mod projection;
pub mod session;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use session::{mint_identity, Session};
