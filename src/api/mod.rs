//! API layer
//!
//! HTTP handlers for:
//! - Owner endpoints (songs, setlists, request queue, import)
//! - Public audience endpoints (shared link views and request intake)

mod catalog;
mod dto;
mod public;
mod requests;
mod setlists;
mod songs;

pub use dto::*;

pub use catalog::catalog_router;
pub use public::public_router;
pub use requests::requests_router;
pub use setlists::setlists_router;
pub use songs::songs_router;
