//! `mudcore`: the world engine behind minimud.
//!
//! Everything here runs on one control thread. The host owns the sockets and
//! hands each connection in as a [`Transport`]; the core never blocks and never
//! touches raw I/O. One call to [`World::poll`] is one scheduling iteration:
//! idle sweep, login promotion, input collection, dispatch, tick check.

pub mod commands;
pub mod graph;
pub mod mover;
pub mod page;
pub mod password;
pub mod record;
pub mod resolver;
pub mod session;
pub mod store;
pub mod transport;
pub mod world;

#[cfg(test)]
pub(crate) mod testkit;

pub use graph::{Exit, LocationGraph, Locator, Room, Zone};
pub use record::{PlayerRecord, RecordError};
pub use session::{LoginState, Role, Session, SessionKey, Sex};
pub use store::{FileStore, Store};
pub use transport::{TermSize, Transport};
pub use world::{Liveness, World, WorldConfig};
