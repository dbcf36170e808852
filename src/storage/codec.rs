//! Partition document codec
//!
//! A partition file is an XML document holding the day buckets of one
//! category:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <events category="command">
//!   <day date="2024-03-05">
//!     <command commandId="cmd.save" count="2"/>
//!   </day>
//!   <day date="2024-03-06">
//!     <launch name="App" type="java" mode="debug" duration="5000" count="1">
//!       <file id="f-1"/>
//!     </launch>
//!   </day>
//! </events>
//! ```
//!
//! Reading never fails: a missing file, an unparseable file, or a document of
//! another category all read as "no buckets". Individual malformed records or
//! day groups are skipped so the rest of the document survives.

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event as XmlEvent};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::merger::Merger;
use crate::storage::types::{Category, DayBucket, Extra, Key, Record};

const ROOT_ELEMENT: &str = "events";
const DAY_ELEMENT: &str = "day";
const FILE_ELEMENT: &str = "file";
const DATE_FORMAT: &str = "%Y-%m-%d";
/// `%.f` keeps full sub-second precision so task keys survive a round trip
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Result of loading a partition file
#[derive(Debug)]
pub enum ReadOutcome {
    /// No file at the path
    Missing,
    /// Parsed buckets (possibly none)
    Loaded(Vec<DayBucket>),
    /// File exists but could not be understood
    Corrupt(StorageError),
}

/// Reads and writes partition files
pub trait Codec: Send + Sync {
    /// Load `path` as a document of `category`, distinguishing absence from
    /// corruption
    fn load(&self, category: Category, path: &Path) -> ReadOutcome;

    /// Replace `path` with a document holding `buckets`
    fn write(&self, category: Category, buckets: &[DayBucket], path: &Path) -> StorageResult<()>;

    /// Tolerant read: absent and corrupt files both yield no buckets
    ///
    /// Corruption is logged at error level, absence is silent.
    fn read(&self, category: Category, path: &Path) -> Vec<DayBucket> {
        match self.load(category, path) {
            ReadOutcome::Missing => Vec::new(),
            ReadOutcome::Loaded(buckets) => buckets,
            ReadOutcome::Corrupt(e) => {
                tracing::error!(
                    %category,
                    path = ?path,
                    "Unreadable partition treated as empty: {}",
                    e
                );
                Vec::new()
            }
        }
    }
}

/// XML partition codec
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn load(&self, category: Category, path: &Path) -> ReadOutcome {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ReadOutcome::Missing,
            Err(e) => return ReadOutcome::Corrupt(StorageError::Io(e)),
        };

        let corrupt = |reason: String| {
            ReadOutcome::Corrupt(StorageError::Corruption {
                path: path.to_path_buf(),
                reason,
            })
        };

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => return corrupt(format!("not UTF-8: {}", e)),
        };

        if text.trim().is_empty() {
            tracing::debug!(path = ?path, "Empty partition file");
            return ReadOutcome::Loaded(Vec::new());
        }

        match decode(category, &text) {
            Ok(buckets) => ReadOutcome::Loaded(buckets),
            Err(reason) => corrupt(reason),
        }
    }

    fn write(&self, category: Category, buckets: &[DayBucket], path: &Path) -> StorageResult<()> {
        let bytes = encode(category, buckets)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = sibling(path, ".tmp");
        std::fs::write(&tmp_path, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::debug!(%category, path = ?path, buckets = buckets.len(), "Wrote partition");
        Ok(())
    }
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Move an unreadable partition aside so its bytes survive the next write
///
/// Returns the backup path `<file>.corrupt-<yyyyMMddHHmmss>`.
pub fn backup_corrupt(path: &Path, now: NaiveDateTime) -> std::io::Result<PathBuf> {
    let backup = sibling(path, &format!(".corrupt-{}", now.format("%Y%m%d%H%M%S")));
    std::fs::rename(path, &backup)?;
    Ok(backup)
}

/// Fold buckets sharing a date into one, keeping first-seen order
///
/// Files written by other versions may repeat a date; records are merged by
/// identity so each date and identity appears once.
pub fn fold_buckets(buckets: Vec<DayBucket>, merger: &dyn Merger) -> Vec<DayBucket> {
    let mut folded: Vec<DayBucket> = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        match folded.iter_mut().find(|b| b.date == bucket.date) {
            Some(existing) => existing.absorb_all(bucket, merger),
            None => {
                let mut fresh = DayBucket::new(bucket.date);
                fresh.absorb_all(bucket, merger);
                folded.push(fresh);
            }
        }
    }
    folded
}

// ============================================================================
// Decoding
// ============================================================================

fn decode(category: Category, xml: &str) -> Result<Vec<DayBucket>, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let record_element = category.record_element().as_bytes();
    let mut buckets = Vec::new();
    let mut day: Option<DayBucket> = None;
    let mut root_open = false;
    let mut root_closed = false;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {}", position, e))?;

        match event {
            XmlEvent::Start(e) => {
                if root_closed {
                    return Err("content after document element".to_string());
                }
                if !root_open {
                    check_root(category, &e)?;
                    root_open = true;
                    continue;
                }

                let is_day = e.name().as_ref() == DAY_ELEMENT.as_bytes();
                let is_record = e.name().as_ref() == record_element;

                if day.is_none() && is_day {
                    match day_date(&e) {
                        Ok(date) => day = Some(DayBucket::new(date)),
                        Err(reason) => {
                            tracing::warn!(%category, "Skipping day group: {}", reason);
                            skip(&mut reader, &e)?;
                        }
                    }
                } else if let (Some(bucket), true) = (day.as_mut(), is_record) {
                    let attrs = attributes(&e)?;
                    let file_ids = read_file_children(&mut reader)?;
                    push_record(category, bucket, attrs, file_ids);
                } else {
                    skip(&mut reader, &e)?;
                }
            }
            XmlEvent::Empty(e) => {
                if root_closed {
                    return Err("content after document element".to_string());
                }
                if !root_open {
                    check_root(category, &e)?;
                    root_open = true;
                    root_closed = true;
                    continue;
                }

                if let Some(bucket) = day.as_mut() {
                    if e.name().as_ref() == record_element {
                        let attrs = attributes(&e)?;
                        push_record(category, bucket, attrs, BTreeSet::new());
                    }
                }
            }
            XmlEvent::End(_) => match day.take() {
                Some(bucket) => buckets.push(bucket),
                None => root_closed = true,
            },
            XmlEvent::Eof => {
                if !root_closed {
                    return Err("unexpected end of document".to_string());
                }
                break;
            }
            _ => {}
        }
    }

    Ok(buckets)
}

fn check_root(category: Category, e: &BytesStart<'_>) -> Result<(), String> {
    if e.name().as_ref() != ROOT_ELEMENT.as_bytes() {
        return Err(format!(
            "unexpected document element <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        ));
    }
    let attrs = attributes(e)?;
    match attrs.get("category") {
        Some(found) if found != category.record_element() => Err(format!(
            "document holds {} events, expected {}",
            found, category
        )),
        _ => Ok(()),
    }
}

fn skip(reader: &mut Reader<&[u8]>, e: &BytesStart<'_>) -> Result<(), String> {
    reader
        .read_to_end(e.name())
        .map(|_| ())
        .map_err(|err| err.to_string())
}

fn attributes(e: &BytesStart<'_>) -> Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| err.to_string())?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn day_date(e: &BytesStart<'_>) -> Result<NaiveDate, String> {
    let attrs = attributes(e)?;
    let raw = attrs.get("date").ok_or("day without date")?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|err| format!("bad date {:?}: {}", raw, err))
}

/// Collect `<file id="..."/>` children up to the enclosing end tag
fn read_file_children(reader: &mut Reader<&[u8]>) -> Result<BTreeSet<String>, String> {
    let mut ids = BTreeSet::new();
    loop {
        match reader.read_event().map_err(|err| err.to_string())? {
            XmlEvent::Empty(child) => {
                if child.name().as_ref() == FILE_ELEMENT.as_bytes() {
                    if let Some(id) = attributes(&child)?.remove("id") {
                        ids.insert(id);
                    }
                }
            }
            XmlEvent::Start(child) => {
                if child.name().as_ref() == FILE_ELEMENT.as_bytes() {
                    if let Some(id) = attributes(&child)?.remove("id") {
                        ids.insert(id);
                    }
                }
                skip(reader, &child)?;
            }
            XmlEvent::End(_) => return Ok(ids),
            XmlEvent::Eof => return Err("unexpected end of document".to_string()),
            _ => {}
        }
    }
}

fn push_record(
    category: Category,
    bucket: &mut DayBucket,
    attrs: BTreeMap<String, String>,
    file_ids: BTreeSet<String>,
) {
    match leaf_to_record(category, &attrs, file_ids) {
        Ok(record) => bucket.records.push(record),
        Err(reason) => {
            tracing::warn!(%category, date = %bucket.date, "Skipping malformed record: {}", reason);
        }
    }
}

fn text(attrs: &BTreeMap<String, String>, name: &str) -> Result<String, String> {
    attrs
        .get(name)
        .cloned()
        .ok_or_else(|| format!("missing attribute {:?}", name))
}

fn amount(attrs: &BTreeMap<String, String>, name: &str) -> Result<i64, String> {
    let raw = attrs
        .get(name)
        .ok_or_else(|| format!("missing attribute {:?}", name))?;
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("attribute {:?} is not an integer: {:?}", name, raw))?;
    if value < 0 {
        return Err(format!("attribute {:?} is negative: {}", name, value));
    }
    Ok(value)
}

fn leaf_to_record(
    category: Category,
    attrs: &BTreeMap<String, String>,
    file_ids: BTreeSet<String>,
) -> Result<Record, String> {
    let record = match category {
        Category::Command => Record::new(
            Key::command(text(attrs, "commandId")?),
            amount(attrs, "count")?,
        ),
        Category::Part => Record::new(
            Key::part(text(attrs, "partId")?),
            amount(attrs, "duration")?,
        ),
        Category::Perspective => Record::new(
            Key::perspective(text(attrs, "perspectiveId")?),
            amount(attrs, "duration")?,
        ),
        Category::File => Record::new(
            Key::file(text(attrs, "fileId")?),
            amount(attrs, "duration")?,
        ),
        Category::Session => Record::new(Key::Session, amount(attrs, "duration")?),
        Category::Launch => Record::new(
            Key::launch(text(attrs, "name")?, text(attrs, "type")?, text(attrs, "mode")?),
            amount(attrs, "duration")?,
        )
        .with_extra(Extra::Launch {
            count: amount(attrs, "count")?,
            file_ids,
        }),
        Category::Task => {
            let created_raw = text(attrs, "created")?;
            let created = NaiveDateTime::parse_from_str(&created_raw, INSTANT_FORMAT)
                .map_err(|err| format!("bad creation instant {:?}: {}", created_raw, err))?;
            Record::new(
                Key::task(text(attrs, "handle")?, created, text(attrs, "fileId")?),
                amount(attrs, "duration")?,
            )
        }
    };
    Ok(record)
}

// ============================================================================
// Encoding
// ============================================================================

fn encode(category: Category, buckets: &[DayBucket]) -> StorageResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new(ROOT_ELEMENT);
    root.push_attribute(("category", category.record_element()));
    writer.write_event(XmlEvent::Start(root))?;

    for bucket in buckets {
        let date = bucket.date.format(DATE_FORMAT).to_string();
        let mut day = BytesStart::new(DAY_ELEMENT);
        day.push_attribute(("date", date.as_str()));
        writer.write_event(XmlEvent::Start(day))?;

        for record in &bucket.records {
            if record.category() != category {
                tracing::warn!(
                    %category,
                    found = %record.category(),
                    "Dropping record of another category"
                );
                continue;
            }
            write_record(&mut writer, record)?;
        }

        writer.write_event(XmlEvent::End(BytesEnd::new(DAY_ELEMENT)))?;
    }

    writer.write_event(XmlEvent::End(BytesEnd::new(ROOT_ELEMENT)))?;
    Ok(writer.into_inner())
}

fn record_attributes(record: &Record) -> Vec<(&'static str, String)> {
    let mut attrs = match &record.key {
        Key::Command { command_id } => vec![("commandId", command_id.clone())],
        Key::Part { part_id } => vec![("partId", part_id.clone())],
        Key::Perspective { perspective_id } => vec![("perspectiveId", perspective_id.clone())],
        Key::File { file_id } => vec![("fileId", file_id.clone())],
        Key::Session => Vec::new(),
        Key::Launch {
            name,
            launch_type,
            mode,
        } => vec![
            ("name", name.clone()),
            ("type", launch_type.clone()),
            ("mode", mode.clone()),
        ],
        Key::Task {
            handle,
            created,
            file_id,
        } => vec![
            ("handle", handle.clone()),
            ("created", created.format(INSTANT_FORMAT).to_string()),
            ("fileId", file_id.clone()),
        ],
    };
    let measure = if record.category().counts_occurrences() {
        "count"
    } else {
        "duration"
    };
    attrs.push((measure, record.measure.to_string()));
    if let Extra::Launch { count, .. } = &record.extra {
        attrs.push(("count", count.to_string()));
    } else if record.category() == Category::Launch {
        attrs.push(("count", "0".to_string()));
    }
    attrs
}

fn write_record(writer: &mut Writer<Vec<u8>>, record: &Record) -> StorageResult<()> {
    let element = record.category().record_element();
    let mut start = BytesStart::new(element);
    for (name, value) in record_attributes(record) {
        start.push_attribute((name, value.as_str()));
    }

    match &record.extra {
        Extra::Launch { file_ids, .. } if !file_ids.is_empty() => {
            writer.write_event(XmlEvent::Start(start))?;
            for id in file_ids {
                let mut child = BytesStart::new(FILE_ELEMENT);
                child.push_attribute(("id", id.as_str()));
                writer.write_event(XmlEvent::Empty(child))?;
            }
            writer.write_event(XmlEvent::End(BytesEnd::new(element)))?;
        }
        _ => writer.write_event(XmlEvent::Empty(start))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::merger::{LaunchMerger, SumMerger};
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bucket(d: NaiveDate, records: Vec<Record>) -> DayBucket {
        DayBucket { date: d, records }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commandEvents-2024-03.xml");
        assert!(matches!(XmlCodec.load(Category::Command, &path), ReadOutcome::Missing));
        assert!(XmlCodec.read(Category::Command, &path).is_empty());
    }

    #[test]
    fn test_write_then_read_all_categories() {
        let dir = tempdir().unwrap();
        let created = date(2024, 1, 2).and_hms_micro_opt(9, 30, 0, 123_456).unwrap();
        let samples = vec![
            Record::new(Key::command("cmd.save"), 3),
            Record::new(Key::part("org.editor"), 1200),
            Record::new(Key::perspective("java"), 50),
            Record::new(Key::file("/p/a & <b>.rs"), 70),
            Record::new(Key::Session, 900),
            Record::new(Key::launch("App", "java", "debug"), 4000).with_extra(Extra::Launch {
                count: 2,
                file_ids: ["f-1".to_string(), "f-2".to_string()].into_iter().collect(),
            }),
            Record::new(Key::task("task-7", created, "f-3"), 60),
        ];

        for record in samples {
            let category = record.category();
            let path = dir.path().join(format!("{}.xml", category));
            let buckets = vec![bucket(date(2024, 3, 5), vec![record.clone()])];
            XmlCodec.write(category, &buckets, &path).unwrap();

            let read = XmlCodec.read(category, &path);
            assert_eq!(read, buckets, "category {}", category);
        }
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sessionEvents-2024-03.xml");
        let buckets = vec![bucket(date(2024, 3, 1), vec![Record::new(Key::Session, 10)])];
        XmlCodec.write(Category::Session, &buckets, &path).unwrap();

        let names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["sessionEvents-2024-03.xml".to_string()]);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commandEvents-2024-03.xml");
        std::fs::write(&path, b"\x00\xffnot xml at all").unwrap();

        assert!(matches!(
            XmlCodec.load(Category::Command, &path),
            ReadOutcome::Corrupt(_)
        ));
        assert!(XmlCodec.read(Category::Command, &path).is_empty());
    }

    #[test]
    fn test_truncated_document_is_corrupt() {
        let xml = r#"<events category="command"><day date="2024-03-05"><command commandId="a" count="1"/>"#;
        assert!(decode(Category::Command, xml).is_err());
    }

    #[test]
    fn test_other_category_is_incompatible() {
        let xml = r#"<events category="file"><day date="2024-03-05"><file fileId="a" duration="1"/></day></events>"#;
        assert!(decode(Category::Command, xml).is_err());

        let xml = r#"<commandEvents><day date="2024-03-05"/></commandEvents>"#;
        assert!(decode(Category::Command, xml).is_err());
    }

    #[test]
    fn test_malformed_records_and_days_are_skipped() {
        let xml = r#"<?xml version="1.0"?>
<events category="command">
  <!-- written by hand -->
  <day date="2024-03-05">
    <command commandId="ok" count="2"/>
    <command commandId="no-count"/>
    <command commandId="negative" count="-4"/>
    <unknown foo="bar"><nested/></unknown>
  </day>
  <day date="not-a-date">
    <command commandId="lost" count="1"/>
  </day>
  <day date="2024-03-06"/>
</events>"#;

        let buckets = decode(Category::Command, xml).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].date, date(2024, 3, 5));
        assert_eq!(buckets[0].records, vec![Record::new(Key::command("ok"), 2)]);
    }

    #[test]
    fn test_root_without_category_attribute_is_accepted() {
        let xml = r#"<events><day date="2024-03-05"><part partId="p" duration="5"/></day></events>"#;
        let buckets = decode(Category::Part, xml).unwrap();
        assert_eq!(buckets[0].records, vec![Record::new(Key::part("p"), 5)]);

        assert!(decode(Category::Part, "<events/>").unwrap().is_empty());
    }

    #[test]
    fn test_fold_duplicate_days() {
        let d = date(2024, 3, 5);
        let buckets = vec![
            bucket(d, vec![Record::new(Key::command("a"), 1)]),
            bucket(date(2024, 3, 6), vec![Record::new(Key::command("a"), 1)]),
            bucket(d, vec![Record::new(Key::command("a"), 2), Record::new(Key::command("b"), 1)]),
        ];

        let folded = fold_buckets(buckets, &SumMerger);
        assert_eq!(folded.len(), 2);
        assert_eq!(
            folded[0].records,
            vec![Record::new(Key::command("a"), 3), Record::new(Key::command("b"), 1)]
        );
    }

    #[test]
    fn test_fold_launches_unions_files() {
        let d = date(2024, 3, 5);
        let launch = |files: &[&str]| {
            Record::new(Key::launch("App", "java", "run"), 10).with_extra(Extra::Launch {
                count: 1,
                file_ids: files.iter().map(|f| f.to_string()).collect(),
            })
        };
        let folded = fold_buckets(
            vec![bucket(d, vec![launch(&["a"])]), bucket(d, vec![launch(&["b"])])],
            &LaunchMerger,
        );
        assert_eq!(folded[0].records.len(), 1);
        assert!(matches!(
            &folded[0].records[0].extra,
            Extra::Launch { count: 2, file_ids } if file_ids.len() == 2
        ));
    }

    #[test]
    fn test_backup_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fileEvents-2024-03.xml");
        std::fs::write(&path, "garbage").unwrap();

        let now = date(2024, 3, 9).and_hms_opt(14, 5, 6).unwrap();
        let backup = backup_corrupt(&path, now).unwrap();

        assert!(!path.exists());
        assert_eq!(
            backup.file_name().unwrap().to_string_lossy(),
            "fileEvents-2024-03.xml.corrupt-20240309140506"
        );
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "garbage");
    }
}
