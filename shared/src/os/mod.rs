pub mod env_var;

/// Provide file operations
pub mod file {
    use anyhow::Context;
    use std::fs;
    use std::path::PathBuf;

    /// Converts a path relative to the working directory (the crate root
    /// under `cargo test`) into its canonical form
    pub fn get_canonical_path(relative_path: &str) -> anyhow::Result<PathBuf> {
        fs::canonicalize(PathBuf::from(relative_path))
            .with_context(|| format!("unable to resolve file: {}", relative_path))
    }

    /// Reads a file, as provided by a relative path, into a String
    pub fn read_file_to_string(relative_path: &str) -> anyhow::Result<String> {
        let file_path = get_canonical_path(relative_path)?;
        fs::read_to_string(&file_path)
            .with_context(|| format!("unable to read file: {}", file_path.display()))
    }

    #[cfg(test)]
    mod file_tests {
        use super::*;

        #[test]
        fn test_read_fixture() {
            let contents = read_file_to_string("../test/json/job-invocation.json").unwrap();
            assert!(contents.contains("JobInvocation"));
            assert!(read_file_to_string("../test/json/does-not-exist.json").is_err());
        }
    }
}
