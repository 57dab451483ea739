use std::path::Path;
use anyhow::{Context, Result};

/// Ensure directory exists
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))?;
    }
    Ok(())
}

/// Ensure the parent directory of a file path exists
pub fn ensure_parent<P: AsRef<Path>>(path: P) -> Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Check if file exists
pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_file()
}

/// Format number with commas
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Plain or gzip-compressed file access, chosen by a `.gz` extension
pub mod io {
    use anyhow::{Context, Result};
    use flate2::read::MultiGzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::{BufRead, BufReader, BufWriter, Write};
    use std::path::Path;

    /// Whether a path names a gzipped file
    pub fn is_gzipped<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false)
    }

    /// Open a file for buffered reading, decompressing `.gz`
    pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?;

        if is_gzipped(path) {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    /// Buffered file writer; must be closed with [`FileWriter::finish`]
    pub enum FileWriter {
        Plain(BufWriter<File>),
        Gzip(GzEncoder<BufWriter<File>>),
    }

    impl FileWriter {
        /// Create a file for writing, compressing `.gz`
        pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
            let path = path.as_ref();
            super::ensure_parent(path)?;
            let file = File::create(path)
                .with_context(|| format!("Failed to create file: {:?}", path))?;
            let buffered = BufWriter::new(file);

            if is_gzipped(path) {
                Ok(FileWriter::Gzip(GzEncoder::new(buffered, Compression::default())))
            } else {
                Ok(FileWriter::Plain(buffered))
            }
        }

        /// Flush buffers and write the gzip trailer
        pub fn finish(self) -> Result<()> {
            match self {
                FileWriter::Plain(mut w) => w.flush()?,
                FileWriter::Gzip(gz) => gz.finish()?.flush()?,
            }
            Ok(())
        }
    }

    impl Write for FileWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self {
                FileWriter::Plain(w) => w.write(buf),
                FileWriter::Gzip(w) => w.write(buf),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            match self {
                FileWriter::Plain(w) => w.flush(),
                FileWriter::Gzip(w) => w.flush(),
            }
        }
    }
}
