pub mod track_association_engine;
pub mod tracked_identity;
