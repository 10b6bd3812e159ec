use memmap2::Mmap;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{IndexerError, Result};

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// What the integrity check saw inside a jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JarSummary {
    pub size: u64,
    pub entries: usize,
    pub java_files: usize,
    pub class_files: usize,
    pub has_manifest: bool,
}

fn open_archive(jar_path: &Path) -> io::Result<Mmap> {
    let file = File::open(jar_path)?;
    // SAFETY: the jar is opened read-only and staged jars are replaced by
    // copy-then-rename, never rewritten in place while mapped.
    unsafe { Mmap::map(&file) }
}

/// Full integrity check: the file must be non-empty, parse as a zip, and
/// every entry must decompress with a matching CRC.
pub fn validate_jar(jar_path: &Path) -> Result<JarSummary> {
    let invalid = |msg: String| IndexerError::InvalidSource(msg);

    let meta = fs::metadata(jar_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            IndexerError::ResourceNotFound(format!("JAR file not found: {}", jar_path.display()))
        }
        _ => invalid(format!("Cannot read JAR file {}: {e}", jar_path.display())),
    })?;
    if !meta.is_file() {
        return Err(invalid(format!("Not a file: {}", jar_path.display())));
    }
    if meta.len() == 0 {
        return Err(invalid(format!("JAR file is empty: {}", jar_path.display())));
    }

    let mmap = open_archive(jar_path)
        .map_err(|e| invalid(format!("Cannot read JAR file {}: {e}", jar_path.display())))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .map_err(|e| invalid(format!("Invalid JAR/ZIP file {}: {e}", jar_path.display())))?;

    let mut summary = JarSummary {
        size: meta.len(),
        entries: archive.len(),
        ..Default::default()
    };

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| invalid(format!("Corrupted entry #{i} in {}: {e}", jar_path.display())))?;
        let name = entry.name().to_string();
        if name.ends_with(".java") {
            summary.java_files += 1;
        } else if name.ends_with(".class") {
            summary.class_files += 1;
        } else if name == MANIFEST_ENTRY {
            summary.has_manifest = true;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| invalid(format!("Corrupted entry {name} in {}: {e}", jar_path.display())))?;
    }

    if !summary.has_manifest {
        debug!(jar = %jar_path.display(), "jar has no manifest");
    }
    if summary.java_files == 0 {
        warn!(jar = %jar_path.display(), "jar contains no .java sources");
    }
    Ok(summary)
}

/// Unpacks every entry of `jar_path` below `dest`. Entries whose names would
/// escape `dest` are skipped. Returns the number of files written.
pub fn extract_jar(jar_path: &Path, dest: &Path) -> Result<usize> {
    let mmap = open_archive(jar_path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..])).map_err(|e| {
        IndexerError::ExtractionFailed(format!("Invalid JAR/ZIP file {}: {e}", jar_path.display()))
    })?;

    fs::create_dir_all(dest)?;
    let mut written = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            IndexerError::ExtractionFailed(format!("Corrupted entry #{i} in {}: {e}", jar_path.display()))
        })?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    debug!(jar = %jar_path.display(), dest = %dest.display(), files = written, "extracted jar");
    Ok(written)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    pub fn write_jar(path: &Path, entries: &[(&str, &str)]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}
