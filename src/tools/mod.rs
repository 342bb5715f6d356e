mod catalog;
mod path_validator;
mod schedule_artifact;
mod temp_cleaner;

pub use catalog::{RecordingPlan, SequenceCatalog};
pub use path_validator::{ensure_directory_exists, validate_file_exists};
pub use schedule_artifact::{
    JsonScheduleMaterializer, SCHEDULE_FILE_NAME, digest_bytes, load_schedule_artifact,
    verify_schedule, write_schedule_artifact,
};
pub use temp_cleaner::{count_files, remove_all_runs, remove_run_artifacts};
