pub mod entity_state;
pub mod entity_store;
