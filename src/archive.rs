use std::io::{Cursor, Read};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, Header};

/// Packs one uploaded contract file into a gzip-compressed tar archive.
/// The archive always carries exactly one entry, named after the original
/// upload.
pub fn pack_single_entry(file_name: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    if file_name.trim().is_empty() {
        bail!("file name must not be empty");
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, sanitize_entry_name(file_name), bytes)
        .context("failed to append file to archive")?;

    let encoder = builder
        .into_inner()
        .context("failed to finalize archive")?;
    let compressed = encoder.finish().context("failed to finish compression")?;
    Ok(compressed)
}

/// Reads back the single entry of an archive produced by
/// [`pack_single_entry`]. Returns the stored entry name and its bytes.
pub fn unpack_single_entry(archive_bytes: &[u8]) -> Result<(String, Vec<u8>)> {
    let decoder = GzDecoder::new(Cursor::new(archive_bytes));
    let mut archive = Archive::new(decoder);

    let mut entries = archive.entries().context("failed to read archive")?;
    let entry = entries
        .next()
        .context("archive contains no entries")?
        .context("failed to read archive entry")?;

    let name = entry
        .path()
        .context("failed to read entry path")?
        .to_string_lossy()
        .into_owned();

    let mut bytes = Vec::new();
    let mut entry = entry;
    entry
        .read_to_end(&mut bytes)
        .context("failed to read entry content")?;

    if entries.next().is_some() {
        bail!("archive contains more than one entry");
    }

    Ok((name, bytes))
}

fn sanitize_entry_name(file_name: &str) -> String {
    file_name
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            _ => ch,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_one_entry() {
        let packed = pack_single_entry("decision.pdf", b"binary contract data").unwrap();
        let (name, bytes) = unpack_single_entry(&packed).unwrap();
        assert_eq!(name, "decision.pdf");
        assert_eq!(bytes, b"binary contract data");
    }

    #[test]
    fn rejects_empty_file_name() {
        assert!(pack_single_entry("   ", b"data").is_err());
    }

    #[test]
    fn strips_path_separators_from_entry_name() {
        let packed = pack_single_entry("../escape/evil.pdf", b"x").unwrap();
        let (name, _) = unpack_single_entry(&packed).unwrap();
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
    }

    #[test]
    fn output_is_gzip_framed() {
        let packed = pack_single_entry("a.txt", b"hello").unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
    }
}
