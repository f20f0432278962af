//! Bot core - routes Telegram text messages to search or the completion API.

pub mod group_context;
pub mod intent;
pub mod limiter;
pub mod memory;
pub mod message;
pub mod router;


pub use message::{ChatType, IncomingMessage};
pub use router::{Completer, MessageRouter, Searcher, Stores};
