pub mod resolution_queue;
pub mod resolved_identity;
pub mod submission_gate;
pub mod submission_record;
