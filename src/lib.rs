pub mod errors;
pub mod config;
pub mod phase;
pub mod namespace;
pub mod snapshot;
pub mod data_store;
pub mod collaborator;
pub mod registration;
pub mod engine;
pub mod replay;
pub mod types;
pub mod datastore;

// Re-export key types and structs for easier access
pub use errors::{DatastoreError, ErrorKind, Result};
pub use config::DatastoreConfig;
pub use phase::Phase;
pub use collaborator::{Collaborator, NoopCollaborator};
pub use data_store::entity_state::EntityState;
pub use data_store::entity_store::EntityStore;
pub use engine::EntityTable;
pub use registration::{EnableRequest, EntityKind, TypeRegistration};
pub use datastore::{prelude, Collaborators, Datastore};
