use std::fmt::Display;

/// one downloadable file of a provider record. `size` is 0 when the
/// provider does not report it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub url: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, size: u64) -> FileDescriptor {
        FileDescriptor {
            name: name.into(),
            url: url.into(),
            size,
        }
    }

    /// filename with path separators neutralized, safe to join onto the
    /// download directory.
    pub fn sanitized_name(&self) -> String {
        self.name.replace(['/', '\\'], "_")
    }

    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => format!(".{}", ext.to_lowercase()),
            None => String::new(),
        }
    }
}

impl Display for FileDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitization_neutralizes_separators() {
        let file = FileDescriptor::new("sub/dir\\file.tif", "https://x/file", 10);
        assert_eq!(file.sanitized_name(), "sub_dir_file.tif");
    }

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(FileDescriptor::new("A.ZIP", "u", 0).extension(), ".zip");
        assert_eq!(FileDescriptor::new("noext", "u", 0).extension(), "");
        assert_eq!(
            FileDescriptor::new("data.tar.gz", "u", 0).extension(),
            ".gz"
        );
    }
}
