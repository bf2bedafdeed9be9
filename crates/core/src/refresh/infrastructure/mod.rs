pub mod flag_file_identity_index;
