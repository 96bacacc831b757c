/// Name-based include/exclude rules for directory transfers.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    /// When non-empty, only files ending with one of these are transferred.
    pub extensions: Vec<String>,
    /// Exact file names to skip.
    pub ignore_files: Vec<String>,
    /// File name suffixes to skip.
    pub ignore_extensions: Vec<String>,
    /// Directory names not descended into.
    pub ignore_paths: Vec<String>,
}

impl PathFilter {
    pub fn allows_file(&self, name: &str) -> bool {
        if !self.extensions.is_empty() && !self.extensions.iter().any(|e| name.ends_with(e.as_str())) {
            return false;
        }
        if self.ignore_files.iter().any(|f| f == name) {
            return false;
        }
        !self.ignore_extensions.iter().any(|e| name.ends_with(e.as_str()))
    }

    pub fn allows_dir(&self, name: &str) -> bool {
        !self.ignore_paths.iter().any(|p| p == name)
    }
}
