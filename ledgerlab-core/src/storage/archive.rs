//! Directory archiving for scenario extracts.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs a local directory tree into one archive.
pub trait Archiver: Send + Sync {
    /// File extension of the produced archive, without the dot.
    fn extension(&self) -> &str;

    /// Archive every regular file under `dir`. Entry names are relative to
    /// `dir` and always use `/` as separator.
    fn archive_dir(&self, dir: &Path) -> io::Result<Vec<u8>>;
}

/// Deflate-compressed zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn extension(&self) -> &str {
        "zip"
    }

    fn archive_dir(&self, dir: &Path) -> io::Result<Vec<u8>> {
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for file in &files {
            let name = entry_name(dir, file)?;
            zip.start_file(name, options).map_err(io::Error::other)?;
            zip.write_all(&fs::read(file)?)?;
        }
        let cursor = zip.finish().map_err(io::Error::other)?;
        Ok(cursor.into_inner())
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Relative path of `file` under `root`, joined with `/`.
pub fn entry_name(root: &Path, file: &Path) -> io::Result<String> {
    let relative = file
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_preserves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("raw")).unwrap();
        fs::write(dir.path().join("raw/t1.csv"), "a\n").unwrap();
        fs::write(dir.path().join("s.csv"), "b\n").unwrap();

        let bytes = ZipArchiver.archive_dir(dir.path()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["raw/t1.csv", "s.csv"]);

        let mut content = String::new();
        archive
            .by_name("raw/t1.csv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "a\n");
    }
}
