//! Output naming for card generation: sanitising, grouping, collision
//! avoidance, and shared-file replication.
//!
//! ## Why first-encounter grouping?
//!
//! A sorted group-by reorders folders relative to the sheet, and the
//! `group_<N>` fallback name would then depend on how keys happen to sort.
//! Bucketing in the order keys first appear keeps folder order, `group_<N>`
//! numbering, and the user's mental model of "row order" aligned.

use crate::error::OfficeConvError;
use crate::pipeline::sheet::Record;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keep letters, digits, space, `-` and `_`; trim surrounding spaces.
///
/// Letters and digits are Unicode-aware, so CJK names survive intact.
///
/// ```rust
/// use officeconv::pipeline::naming::sanitize_name;
/// assert_eq!(sanitize_name("Case #1/2024"), "Case 12024");
/// assert_eq!(sanitize_name("  张三-A  "), "张三-A");
/// assert_eq!(sanitize_name("#/?"), "");
/// ```
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

// ── Grouping ─────────────────────────────────────────────────────────────

/// Rows sharing one naming-field value.
#[derive(Debug)]
pub struct Group<'a> {
    /// 0-based position among groups (first-encounter order).
    pub index: usize,
    /// Raw naming-field value shared by every row in the group.
    pub key: String,
    /// Rows in original sheet order.
    pub records: Vec<&'a Record>,
}

impl Group<'_> {
    /// Sanitised key, or `group_<index>` when nothing survives sanitising.
    pub fn base_name(&self) -> String {
        let clean = sanitize_name(&self.key);
        if clean.is_empty() {
            format!("group_{}", self.index)
        } else {
            clean
        }
    }
}

/// Partition `records` by the value of `field`, in first-encounter order.
///
/// Rows lacking the column group under the empty key.
pub fn group_records<'a>(records: &'a [Record], field: &str) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut slot: HashMap<&'a str, usize> = HashMap::new();

    for record in records {
        let key = record.get(field).unwrap_or("");
        let idx = *slot.entry(key).or_insert_with(|| {
            groups.push(Group {
                index: groups.len(),
                key: key.to_string(),
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].records.push(record);
    }
    groups
}

/// Hands out directory names that are unique within one run.
///
/// Two distinct keys can sanitise to the same text (`"A/1"` and `"A1"`);
/// the second gets `_2`, the third `_3`, and so on, instead of silently
/// sharing (and overwriting inside) the first one's folder.
#[derive(Debug, Default)]
pub struct DirNames {
    taken: HashSet<String>,
}

impl DirNames {
    pub fn claim(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

// ── Flat-mode file names ─────────────────────────────────────────────────

/// First free `<stem>.<ext>`, `<stem>_1.<ext>`, `<stem>_2.<ext>`, … in `dir`.
///
/// "Free" means no file of that name exists on disk, so names written
/// earlier in the same run, and files left over from a previous run, are
/// both avoided.
pub fn unique_file_name(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{ext}"));
    if !first.exists() {
        return first;
    }
    let mut counter = 1usize;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Stem for a flat-mode row: the sanitised naming value, or `row_<n>`
/// (1-based) when it sanitises to nothing.
pub fn row_stem(value: &str, row_index: usize) -> String {
    let clean = sanitize_name(value);
    if clean.is_empty() {
        format!("row_{}", row_index + 1)
    } else {
        clean
    }
}

// ── Shared directory replication ─────────────────────────────────────────

/// Copy every regular file directly inside `source` into `target`.
///
/// Shallow: subdirectories are skipped. Existing files in `target` are
/// overwritten. A missing `source` is a no-op. Returns the number of files
/// copied.
pub fn copy_dir_files(source: &Path, target: &Path) -> Result<usize, OfficeConvError> {
    if !source.is_dir() {
        debug!("Shared directory {} not found; nothing to copy", source.display());
        return Ok(0);
    }

    let listing = fs::read_dir(source).map_err(|e| OfficeConvError::filesystem(source, e))?;
    let mut copied = 0;
    for entry in listing {
        let entry = entry.map_err(|e| OfficeConvError::filesystem(source, e))?;
        let from = entry.path();
        if !from.is_file() {
            continue;
        }
        let to = target.join(entry.file_name());
        fs::copy(&from, &to).map_err(|e| OfficeConvError::filesystem(&to, e))?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, n: &str) -> Record {
        [("Name", name), ("N", n)].into_iter().collect()
    }

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize_name("Case #1/2024"), "Case 12024");
        assert_eq!(sanitize_name("a_b-c d"), "a_b-c d");
        assert_eq!(sanitize_name("  padded  "), "padded");
        assert_eq!(sanitize_name("!!!"), "");
        assert_eq!(sanitize_name(""), "");
    }

    #[test]
    fn sanitize_keeps_unicode_letters() {
        assert_eq!(sanitize_name("订单:001"), "订单001");
    }

    #[test]
    fn groups_in_first_encounter_order() {
        let records = vec![
            rec("Zed", "1"),
            rec("Amy", "2"),
            rec("Zed", "3"),
            rec("Bob", "4"),
            rec("Amy", "5"),
        ];
        let groups = group_records(&records, "Name");
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Zed", "Amy", "Bob"]);
        let zed: Vec<&str> = groups[0]
            .records
            .iter()
            .map(|r| r.get("N").unwrap())
            .collect();
        assert_eq!(zed, vec!["1", "3"]);
        assert_eq!(groups[2].index, 2);
    }

    #[test]
    fn punctuation_only_group_uses_index() {
        let records = vec![rec("ok", "1"), rec("#?!", "2")];
        let groups = group_records(&records, "Name");
        assert_eq!(groups[0].base_name(), "ok");
        assert_eq!(groups[1].base_name(), "group_1");
    }

    #[test]
    fn dir_names_disambiguate_collisions() {
        let mut names = DirNames::default();
        assert_eq!(names.claim("A1"), "A1");
        assert_eq!(names.claim("A1"), "A1_2");
        assert_eq!(names.claim("A1"), "A1_3");
        assert_eq!(names.claim("B"), "B");
    }

    #[test]
    fn unique_file_name_suffixes_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_file_name(dir.path(), "A", "png");
        assert_eq!(first.file_name().unwrap(), "A.png");
        fs::write(&first, b"x").unwrap();

        let second = unique_file_name(dir.path(), "A", "png");
        assert_eq!(second.file_name().unwrap(), "A_1.png");
        fs::write(&second, b"x").unwrap();

        let third = unique_file_name(dir.path(), "A", "png");
        assert_eq!(third.file_name().unwrap(), "A_2.png");
    }

    #[test]
    fn row_stem_falls_back_to_one_based_index() {
        assert_eq!(row_stem("Alice", 0), "Alice");
        assert_eq!(row_stem("", 0), "row_1");
        assert_eq!(row_stem("***", 4), "row_5");
    }

    #[test]
    fn copy_dir_files_is_shallow_and_overwrites() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"new").unwrap();
        fs::write(src.path().join("b.pdf"), b"pdf").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub").join("deep.txt"), b"x").unwrap();
        fs::write(dst.path().join("a.txt"), b"old").unwrap();

        let copied = copy_dir_files(src.path(), dst.path()).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"new");
        assert!(dst.path().join("b.pdf").exists());
        assert!(!dst.path().join("sub").exists());
    }

    #[test]
    fn copy_from_missing_dir_is_noop() {
        let dst = tempfile::tempdir().unwrap();
        let copied = copy_dir_files(Path::new("/no/such/share"), dst.path()).unwrap();
        assert_eq!(copied, 0);
    }
}
