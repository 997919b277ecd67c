//! Packed tile archives.
//!
//! Remote sources serve each tile as a ZIP archive holding a single `.hgt`
//! file. Hidden entries (names starting with `.`) and directories are
//! ignored; anything other than exactly one remaining entry is rejected.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ElevationError, Result};

/// Extract the single tile from a packed archive.
///
/// `file_name` is only used in error messages.
///
/// # Errors
///
/// Returns [`ElevationError::InvalidArchive`] if the archive holds zero or
/// several non-hidden entries, or [`ElevationError::Zip`] if it cannot be
/// read at all.
pub fn unpack(file_name: &str, data: &[u8]) -> Result<Vec<u8>> {
    tracing::debug!(file = file_name, bytes = data.len(), "unpacking archive");

    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let mut candidates = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() || is_hidden(entry.name()) {
            continue;
        }
        candidates.push(i);
    }

    let index = match candidates.as_slice() {
        [index] => *index,
        [] => {
            return Err(ElevationError::InvalidArchive {
                file_name: file_name.to_string(),
                reason: "no tile entry".to_string(),
            })
        }
        many => {
            return Err(ElevationError::InvalidArchive {
                file_name: file_name.to_string(),
                reason: format!("{} candidate entries", many.len()),
            })
        }
    };

    let mut entry = archive.by_index(index)?;
    let mut contents = Vec::with_capacity(initial_capacity(entry.size()));
    entry.read_to_end(&mut contents)?;

    tracing::debug!(file = file_name, bytes = contents.len(), "unpacked");
    Ok(contents)
}

/// Largest tile a single entry can legitimately hold (3601 × 3601 samples).
const MAX_TILE_BYTES: u64 = 2 * 3601 * 3601;

/// Buffer size to reserve for an entry declaring `declared` bytes.
///
/// The declared size comes from the archive header and is not trusted past
/// the largest real tile.
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_TILE_BYTES) as usize
}

/// Pack `data` into a deflated archive holding one entry named `entry_name`.
pub fn pack(entry_name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry_name, options)?;
        zip.write_all(data)?;
        zip.finish()?;
    }
    Ok(buffer)
}

/// Whether the last path component of an entry name starts with a dot.
fn is_hidden(name: &str) -> bool {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|base| base.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options =
                || SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, data) in entries {
                if name.ends_with('/') {
                    zip.add_directory(*name, options()).unwrap();
                } else {
                    zip.start_file(*name, options()).unwrap();
                    zip.write_all(data).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buffer
    }

    #[test]
    fn test_pack_and_unpack() {
        let data = vec![7u8; 1000];
        let packed = pack("N35E138.hgt", &data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(unpack("N35E138.hgt.zip", &packed).unwrap(), data);
    }

    #[test]
    fn test_ignores_hidden_and_directories() {
        let archive = archive_with(&[
            (".DS_Store", b"junk"),
            ("N35E138/", b""),
            ("N35E138/.hidden", b"junk"),
            ("N35E138/N35E138.hgt", &[1, 2, 3, 4]),
        ]);
        assert_eq!(unpack("N35E138.hgt.zip", &archive).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_entry_name_does_not_matter() {
        let archive = archive_with(&[("data.bin", &[5, 6])]);
        assert_eq!(unpack("N35E138.hgt.zip", &archive).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_empty_archive() {
        let archive = archive_with(&[(".hidden", b"junk")]);
        let err = unpack("N35E138.hgt.zip", &archive).unwrap_err();
        assert!(matches!(err, ElevationError::InvalidArchive { .. }));
        assert!(err.to_string().contains("N35E138.hgt.zip"));
    }

    #[test]
    fn test_ambiguous_archive() {
        let archive = archive_with(&[("N35E138.hgt", &[0, 0]), ("N35E139.hgt", &[0, 0])]);
        assert!(matches!(
            unpack("N35E138.hgt.zip", &archive),
            Err(ElevationError::InvalidArchive { reason, .. }) if reason.contains('2')
        ));
    }

    #[test]
    fn test_not_an_archive() {
        assert!(matches!(
            unpack("N35E138.hgt.zip", b"<html>404</html>"),
            Err(ElevationError::Zip(_))
        ));
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(2 * 1201 * 1201), 2 * 1201 * 1201);
        assert_eq!(initial_capacity(0), 0);
        assert_eq!(initial_capacity(u64::MAX), MAX_TILE_BYTES as usize);
        assert_eq!(initial_capacity(1 << 40), MAX_TILE_BYTES as usize);
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(".DS_Store"));
        assert!(is_hidden("__MACOSX/._N35E138.hgt"));
        assert!(is_hidden(".git/"));
        assert!(!is_hidden("N35E138.hgt"));
        assert!(!is_hidden("dir.d/N35E138.hgt"));
    }
}
