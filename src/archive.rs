use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::FetchError;

/// Packs named text payloads into one deflated zip, in the order given.
///
/// A repeated name keeps its first position and takes the last payload, so
/// the archive never holds two entries with the same name.
pub fn build<'a, I>(entries: I) -> Result<Vec<u8>, FetchError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut unique: Vec<(&str, &str)> = Vec::new();
    for (name, payload) in entries {
        match unique.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = payload,
            None => unique.push((name, payload)),
        }
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, payload) in unique {
        writer
            .start_file(name, options)
            .map_err(|err| FetchError::Archive(format!("{name}: {err}")))?;
        writer
            .write_all(payload.as_bytes())
            .map_err(|err| FetchError::Archive(format!("{name}: {err}")))?;
    }
    let cursor = writer
        .finish()
        .map_err(|err| FetchError::Archive(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Reads every file entry back as `(name, content)`, in archive order.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<(String, String)>, FetchError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| FetchError::Archive(err.to_string()))?;

    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| FetchError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|err| FetchError::Archive(err.to_string()))?;
        out.push((entry.name().to_string(), content));
    }
    Ok(out)
}
