use crate::errors::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Accepted name suffixes. Matching is case-sensitive: `photo.JPG` is not picked up.
pub const SUPPORTED_SUFFIXES: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// A file selected for processing. `file_name` is the correlation key for its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub file_name: String,
    pub path: PathBuf,
}

pub fn is_supported_file_name(file_name: &str) -> bool {
    SUPPORTED_SUFFIXES
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

/// Lists the eligible regular files directly inside `input_dir`, sorted by name.
///
/// Failing to read the directory itself is fatal; unreadable entries are skipped.
pub fn collect_image_files(input_dir: &Path) -> Result<Vec<InputFile>> {
    if !input_dir.is_dir() {
        return Err(PipelineError::file_system(
            input_dir,
            "input directory listing",
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "input directory does not exist",
            ),
        ));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                return Err(PipelineError::file_system(
                    input_dir,
                    "input directory listing",
                    source,
                ));
            }
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            warn!("Skipping non UTF-8 file name: {:?}", entry.file_name());
            continue;
        };

        if is_supported_file_name(file_name) {
            files.push(InputFile {
                file_name: file_name.to_string(),
                path: entry.into_path(),
            });
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_suffixes() {
        let test_cases = vec![
            ("a.png", true),
            ("d.jpg", true),
            ("e.jpeg", true),
            ("b.txt", false),
            ("c.JPEG", false),
            ("f.Png", false),
            ("png", false),
            ("archive.png.zip", false),
        ];

        for (file_name, expected) in test_cases {
            assert_eq!(is_supported_file_name(file_name), expected, "{file_name}");
        }
    }

    #[test]
    fn test_collect_filters_case_sensitively() -> Result<()> {
        let temp_dir = TempDir::new()?;
        for name in ["a.png", "b.txt", "c.JPEG", "d.jpg"] {
            fs::write(temp_dir.path().join(name), b"x")?;
        }

        let names: Vec<_> = collect_image_files(temp_dir.path())?
            .into_iter()
            .map(|f| f.file_name)
            .collect();

        assert_eq!(names, vec!["a.png".to_string(), "d.jpg".to_string()]);
        Ok(())
    }

    #[test]
    fn test_collect_skips_directories_and_nested_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("folder.png"))?;
        fs::write(temp_dir.path().join("folder.png").join("inner.png"), b"x")?;
        fs::write(temp_dir.path().join("top.jpeg"), b"x")?;

        let files = collect_image_files(temp_dir.path())?;

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "top.jpeg");
        assert_eq!(files[0].path, temp_dir.path().join("top.jpeg"));
        Ok(())
    }

    #[test]
    fn test_missing_input_dir_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let err = collect_image_files(&temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, PipelineError::FileSystem { .. }));
        Ok(())
    }

    // Linux file systems accept arbitrary bytes in names; APFS does not.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_collect_skips_non_utf8_names() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new()?;
        fs::write(
            temp_dir.path().join(OsStr::from_bytes(b"bad\xff\xfe.png")),
            b"x",
        )?;
        fs::write(temp_dir.path().join("good.png"), b"x")?;

        let names: Vec<_> = collect_image_files(temp_dir.path())?
            .into_iter()
            .map(|f| f.file_name)
            .collect();

        assert_eq!(names, vec!["good.png".to_string()]);
        Ok(())
    }
}
