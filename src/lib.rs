#[macro_use]
extern crate error_chain;

pub mod errors;

pub mod cipher;
pub mod config;
pub mod log;
pub mod node;
pub mod protos;
pub mod rpc;
pub mod state;
pub mod state_machine;
pub mod timer;

mod consensus;

pub use config::RaftConfig;
pub use consensus::{RoleKind, RoleListener, RoleSnapshot};
pub use node::{Node, NodeConfig};
