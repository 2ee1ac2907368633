use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::schema::Column;

/// Longest partition directory name written, below the usual 255-byte NAME_MAX
pub const MAX_DIR_NAME_LEN: usize = 200;

/// Separates a shortened value from its hash. `urlencoding` always escapes
/// `+`, so it never appears in a full-length name.
const SHORTENED_MARKER: char = '+';

/// A partition directory name taken apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDir {
    pub field: String,
    /// `None` when the name was shortened; the value then lives only in the files.
    pub value: Option<String>,
}

/// Relative directory of a partition, e.g. `status=404`.
///
/// The value is percent-encoded so that `/` and other separators in the raw
/// value cannot escape the dataset root. Names longer than
/// [`MAX_DIR_NAME_LEN`] keep an encoded prefix followed by `+` and the XXH3
/// hash of the full value.
pub fn partition_dir(field: Column, value: &str) -> String {
    let dir = format!("{}={}", field.name(), urlencoding::encode(value));
    if dir.len() <= MAX_DIR_NAME_LEN {
        return dir;
    }

    let digest = format!("{:016x}", xxh3_64(value.as_bytes()));
    let mut cut = MAX_DIR_NAME_LEN - digest.len() - SHORTENED_MARKER.len_utf8();
    // Never split a %XX escape
    if let Some(pos) = dir[..cut].rfind('%').filter(|pos| cut - pos < 3) {
        cut = pos;
    }
    format!("{}{}{}", &dir[..cut], SHORTENED_MARKER, digest)
}

/// Inverse of [`partition_dir`] for a single path component
pub fn parse_partition_dir(component: &str) -> Option<PartitionDir> {
    let (field, encoded) = component.split_once('=')?;
    if field.is_empty() {
        return None;
    }
    let value = if encoded.contains(SHORTENED_MARKER) {
        None
    } else {
        Some(urlencoding::decode(encoded).ok()?.into_owned())
    };
    Some(PartitionDir {
        field: field.to_string(),
        value,
    })
}

/// True for directory names this writer creates for a record column
pub fn is_partition_dir(component: &str) -> bool {
    parse_partition_dir(component).is_some_and(|dir| dir.field.parse::<Column>().is_ok())
}

pub fn file_name(batch_index: usize) -> String {
    format!("part-{:05}.parquet", batch_index)
}

/// True for names produced by [`file_name`]
pub fn is_part_file(name: &str) -> bool {
    name.strip_prefix("part-")
        .and_then(|rest| rest.strip_suffix(".parquet"))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Final location of one batch's file for one partition key
pub fn file_path(root: &Path, partition: Option<(Column, &str)>, batch_index: usize) -> PathBuf {
    match partition {
        Some((field, value)) => root.join(partition_dir(field, value)).join(file_name(batch_index)),
        None => root.join(file_name(batch_index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpartitioned_path() {
        let path = file_path(Path::new("/lake"), None, 3);
        assert_eq!(path, PathBuf::from("/lake/part-00003.parquet"));
    }

    #[test]
    fn test_partitioned_path() {
        let path = file_path(Path::new("/lake"), Some((Column::Status, "404")), 0);
        assert_eq!(path, PathBuf::from("/lake/status=404/part-00000.parquet"));
    }

    #[test]
    fn test_values_are_escaped() {
        let dir = partition_dir(Column::Request, "/a/../b c+d");
        assert!(!dir.contains('/'));
        assert_eq!(
            parse_partition_dir(&dir),
            Some(PartitionDir {
                field: "request".to_string(),
                value: Some("/a/../b c+d".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_rejects_plain_names() {
        assert_eq!(parse_partition_dir("part-00000.parquet"), None);
        assert_eq!(parse_partition_dir("=x"), None);
    }

    #[test]
    fn test_long_values_are_shortened() {
        let agent = format!("Mozilla/5.0 ({})", "KHTML, like Gecko; ".repeat(40));
        let dir = partition_dir(Column::UserAgent, &agent);
        assert!(dir.len() <= MAX_DIR_NAME_LEN);
        assert!(dir.starts_with("user_agent=Mozilla%2F5.0"));
        assert_eq!(
            parse_partition_dir(&dir),
            Some(PartitionDir {
                field: "user_agent".to_string(),
                value: None,
            })
        );

        // Same value, same name; different tail, different name
        assert_eq!(dir, partition_dir(Column::UserAgent, &agent));
        let other = format!("{}x", agent);
        assert_ne!(dir, partition_dir(Column::UserAgent, &other));
    }

    #[test]
    fn test_shortening_never_splits_an_escape() {
        for pad in 0..3 {
            let value = format!("{}{}", "a".repeat(pad), "/".repeat(120));
            let dir = partition_dir(Column::Request, &value);
            let (prefix, _) = dir.split_once('+').unwrap();
            let encoded = prefix.trim_start_matches("request=");
            assert!(urlencoding::decode(encoded).is_ok());
            assert!(!encoded.ends_with('%'));
            assert!(!encoded[..encoded.len() - 1].ends_with('%'));
        }
    }

    #[test]
    fn test_artifact_names() {
        assert!(is_part_file("part-00012.parquet"));
        assert!(!is_part_file("part-.parquet"));
        assert!(!is_part_file("warehouse.parquet"));
        assert!(!is_part_file("part-00001.parquet.tmp"));
        assert!(is_partition_dir("status=404"));
        assert!(!is_partition_dir("colour=red"));
        assert!(!is_partition_dir("logs"));
    }
}
