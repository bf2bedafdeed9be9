pub mod identity_index;
pub mod index_refresh_trigger;
