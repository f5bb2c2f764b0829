use std::fs::{self, File};
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::errors::TrackerError;
use crate::models::AggregatedRecord;

pub const FIELDNAMES: [&str; 11] = [
    "FavGroup",
    "WorldId",
    "Name",
    "Author",
    "Description",
    "Link",
    "Reference",
    "Status",
    "Created",
    "Published",
    "LastUpdate",
];

pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, TrackerError> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| TrackerError::Encoding(format!("unsupported encoding: {label}")))
}

/// Renders the header plus one row per record. Timestamps are RFC 3339 in
/// UTC, so the output does not depend on the host locale.
pub fn render_records(
    records: &[AggregatedRecord],
    encoding: &'static Encoding,
) -> Result<Vec<u8>, TrackerError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(FIELDNAMES)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    let buffer = writer
        .into_inner()
        .map_err(|err| TrackerError::Io(err.into_error()))?;
    if encoding == UTF_8 {
        return Ok(buffer);
    }
    let utf8 = String::from_utf8(buffer).map_err(|err| TrackerError::Encoding(err.to_string()))?;
    let (encoded, _, had_errors) = encoding.encode(&utf8);
    if had_errors {
        return Err(TrackerError::Encoding(format!(
            "output contains characters not representable in {}",
            encoding.name()
        )));
    }
    Ok(encoded.into_owned())
}

/// Writes the whole report next to `path` first and renames it into place,
/// so a failed run never leaves a truncated file behind.
pub fn write_records(
    path: &Path,
    encoding: &str,
    records: &[AggregatedRecord],
) -> Result<usize, TrackerError> {
    let enc = resolve_encoding(encoding)?;
    let bytes = render_records(records, enc)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(records.len())
}

pub fn read_records(path: &Path, encoding: &str) -> Result<Vec<AggregatedRecord>, TrackerError> {
    let enc = resolve_encoding(encoding)?;
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(enc))
            .build(file),
    );
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorldStatus;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn record() -> AggregatedRecord {
        AggregatedRecord {
            fav_group: "お気に入り".to_string(),
            world_id: "wrld_1".to_string(),
            name: "Quiet, \"Rainy\" Station".to_string(),
            author: "someone".to_string(),
            description: "line one\nline two".to_string(),
            link: "https://vrchat.com/home/world/wrld_1".to_string(),
            reference: "https://www.vrcw.net/world/detail/wrld_1".to_string(),
            status: WorldStatus::Private,
            created: Some(Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap()),
            published: None,
            last_update: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        }
    }

    #[test]
    fn header_matches_serialized_columns() {
        let bytes = render_records(&[record()], UTF_8).expect("render");
        let text = String::from_utf8(bytes).expect("utf8");
        let first_line = text.lines().next().expect("header");
        assert_eq!(first_line, FIELDNAMES.join(","));
        assert!(text.contains("2023-05-01T12:00:00Z"));
    }

    #[test]
    fn empty_report_has_header_only() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("output.csv");
        assert_eq!(write_records(&path, "utf-8", &[]).expect("write"), 0);
        assert!(read_records(&path, "utf-8").expect("read").is_empty());
    }

    #[test]
    fn shift_jis_file_reads_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("output.csv");
        write_records(&path, "shift_jis", &[record()]).expect("write");
        let raw = fs::read(&path).expect("raw");
        assert!(String::from_utf8(raw).is_err());
        assert_eq!(read_records(&path, "shift_jis").expect("read"), vec![record()]);
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(matches!(
            resolve_encoding("klingon"),
            Err(TrackerError::Encoding(_))
        ));
    }
}
