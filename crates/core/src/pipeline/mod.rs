pub mod label_faces_use_case;
pub mod pipeline_logger;
