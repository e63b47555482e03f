use std::{
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

use flipm_shared::log::LevelFilter;
use simple_logger::SimpleLogger;

/// Folder in which tests can leave files for debugging
pub const TEST_RESULT_FOLDER: &str = "test_results";

/// Installs a logger that prints everything. Can be called from every test.
pub fn setup_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another test harness might have installed a logger already.
        let _ = SimpleLogger::new().with_level(LevelFilter::Trace).init();
    });
}

/// Creates a folder in [`TEST_RESULT_FOLDER`] named after the given function
/// (see [`flipm_shared::function_name`]) and returns its path.
pub fn create_test_result_folder_for_function(function_name: &str) -> PathBuf {
    let folder_name = function_name.replace("::", ".");
    let path = Path::new(TEST_RESULT_FOLDER).join(folder_name);
    if path.exists() {
        fs::remove_dir_all(&path).unwrap_or_else(|_| panic!("Failed to clear test result folder \"{}\"", path.display()));
    }
    fs::create_dir_all(&path).unwrap_or_else(|_| panic!("Failed to create test result folder \"{}\"", path.display()));
    path
}

#[cfg(test)]
mod tests {
    use flipm_shared::function_name;

    use super::*;

    #[test]
    fn test_result_folder_is_empty() {
        let path = create_test_result_folder_for_function(function_name!());
        fs::write(path.join("leftover.txt"), "data").unwrap();
        let path = create_test_result_folder_for_function(function_name!());
        assert!(path.exists());
        assert_eq!(fs::read_dir(&path).unwrap().count(), 0);
    }
}
