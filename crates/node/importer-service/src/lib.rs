//! Actor wiring for the block importer: collaborator channels, the outer state machine, and
//! in-memory demo collaborators suitable for tests and the demonstration binary.

pub mod actor;
pub mod collaborators;
pub mod config;
pub mod demo;
pub mod events;

pub use actor::{ImporterActor, ImporterHandle};
pub use collaborators::{Broadcaster, Fetcher, NewBlock, OmmerPool, TxPool};
pub use config::ImporterConfig;
pub use demo::{DemoBlock, DemoHeader, DemoLedger};
pub use events::{ImportDone, Inbound};
