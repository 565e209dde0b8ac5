// ABOUTME: Stable SHA-256 content digest over selected record columns
// ABOUTME: Used for meta_version_hash stamping and unchanged-row detection

use crate::record::Record;
use crate::value::Value;
use sha2::{Digest, Sha256};

/// Prefix of the bookkeeping columns that never take part in a content digest.
pub const META_PREFIX: &str = "meta_";

/// Hex SHA-256 over `columns` of `record`.
///
/// Columns are sorted by name before hashing, so the digest does not depend
/// on the order they were listed or inserted in. Each entry is written as
/// `name 0x1f tag text 0x1e`, where NULL and empty text hash differently.
/// A column missing from the record hashes like NULL.
pub fn content_digest<S: AsRef<str>>(record: &Record, columns: &[S]) -> String {
    let mut names: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.dedup();

    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
        match record.get(name).and_then(Value::canonical_text) {
            Some(text) => {
                hasher.update(b"v");
                hasher.update(text.as_bytes());
            }
            None => hasher.update(b"n"),
        }
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

/// Digest over every column that is not a `meta_*` bookkeeping column.
pub fn record_digest(record: &Record) -> String {
    let columns: Vec<&str> = record
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| !c.starts_with(META_PREFIX))
        .collect();
    content_digest(record, &columns)
}

/// Set `meta_version_hash` on a record that does not carry one yet.
///
/// With `columns` the digest covers exactly those columns, otherwise every
/// non-`meta_*` column. Returns true when the record was stamped.
pub fn stamp_version_hash(record: &mut Record, columns: Option<&[String]>) -> bool {
    if record.get("meta_version_hash").is_some_and(|v| !v.is_null()) {
        return false;
    }
    let digest = match columns {
        Some(columns) => content_digest(record, columns),
        None => record_digest(record),
    };
    record.insert("meta_version_hash", digest);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_column_order_independent() {
        let first = Record::new().with("a", 1).with("b", "x");
        let second = Record::new().with("b", "x").with("a", 1);
        assert_eq!(
            content_digest(&first, &["a", "b"]),
            content_digest(&second, &["b", "a"])
        );
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let record = Record::new().with("revenue", 10);
        let digest = content_digest(&record, &["revenue"]);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, content_digest(&record.clone(), &["revenue"]));
    }

    #[test]
    fn test_null_and_empty_text_differ() {
        let null = Record::new().with("a", Value::Null);
        let empty = Record::new().with("a", "");
        assert_ne!(content_digest(&null, &["a"]), content_digest(&empty, &["a"]));
        // Missing columns hash like NULL
        assert_eq!(
            content_digest(&null, &["a"]),
            content_digest(&Record::new(), &["a"])
        );
    }

    #[test]
    fn test_value_change_changes_digest() {
        let before = Record::new().with("business_key", "app-42").with("revenue", 10);
        let after = Record::new().with("business_key", "app-42").with("revenue", 15);
        assert_ne!(record_digest(&before), record_digest(&after));
    }

    #[test]
    fn test_record_digest_skips_meta_columns() {
        let plain = Record::new().with("a", 1);
        let stamped = Record::new().with("a", 1).with("meta_version_number", 4);
        assert_eq!(record_digest(&plain), record_digest(&stamped));
    }

    #[test]
    fn test_stamp_version_hash_keeps_existing() {
        let mut record = Record::new().with("a", 1).with("meta_version_hash", "h1");
        assert!(!stamp_version_hash(&mut record, None));
        assert_eq!(record.get("meta_version_hash"), Some(&Value::from("h1")));

        let mut record = Record::new().with("a", 1).with("b", 2);
        let columns = vec!["a".to_string()];
        assert!(stamp_version_hash(&mut record, Some(&columns)));
        let expected = content_digest(&Record::new().with("a", 1), &["a"]);
        assert_eq!(record.get("meta_version_hash"), Some(&Value::Text(expected)));
    }
}
