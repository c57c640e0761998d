//! Markdown content repairs: front-matter placement and duplicate keys
//!
//! Content files sometimes end up with the same key twice in their leading
//! `---` block (e.g. two `title:` lines after a bad merge), which strict YAML
//! parsers reject. The first occurrence wins; later ones are dropped. Only
//! the first block is touched, and files that do not start with `---` are
//! left alone.
//!
//! Front matter is only recognised on the very first line, so blank lines or
//! indentation before the opening `---` are removed first. Files also get a
//! trailing newline if they lack one.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

/// Key of a `key: value` line, if the line has one.
fn front_matter_key(line: &str) -> Option<&str> {
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(line.len());
    if end == 0 || !line[end..].starts_with(':') {
        return None;
    }
    Some(&line[..end])
}

fn is_leading_blank(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// Layout fixes: front matter moved to the first line, trailing newline
/// added. Returns the rewritten text, or `None` when nothing needs to change.
pub fn normalize_layout(text: &str) -> Option<String> {
    let trimmed = text.trim_start_matches(is_leading_blank);
    let mut out = if trimmed.len() != text.len() && trimmed.starts_with("---") {
        trimmed.to_string()
    } else {
        text.to_string()
    };
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    (out != text).then_some(out)
}

/// Returns the rewritten text, or `None` when nothing needs to change.
pub fn dedupe_front_matter(text: &str) -> Option<String> {
    if !text.starts_with("---") {
        return None;
    }

    let mut out = String::with_capacity(text.len());
    let mut seen: HashSet<&str> = HashSet::new();
    let mut fences = 0usize;
    let mut in_front_matter = false;
    let mut dropped = false;

    for line in text.split_inclusive('\n') {
        if line.trim() == "---" {
            fences += 1;
            in_front_matter = fences == 1;
            out.push_str(line);
            continue;
        }
        if in_front_matter {
            if let Some(key) = front_matter_key(line) {
                if !seen.insert(key) {
                    dropped = true;
                    continue;
                }
            }
        }
        out.push_str(line);
    }

    dropped.then_some(out)
}

/// Apply [`normalize_layout`] then [`dedupe_front_matter`] to one file,
/// rewriting it only if something changed. Returns whether it changed.
pub fn fix_file(path: &Path) -> Result<bool> {
    let original = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut text = original.clone();
    if let Some(fixed) = normalize_layout(&text) {
        tracing::debug!("Fixed front matter position or trailing newline: {}", path.display());
        text = fixed;
    }
    if let Some(fixed) = dedupe_front_matter(&text) {
        tracing::debug!("Removed duplicate front matter keys: {}", path.display());
        text = fixed;
    }
    if text == original {
        return Ok(false);
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Outcome of a directory pass
#[derive(Debug, Default, Clone)]
pub struct FixStats {
    pub scanned: u64,
    pub changed: u64,
    pub errors: Vec<String>,
}

/// Fix every `*.{ext}` file below `root`. Unreadable files are reported and skipped.
pub fn fix_tree(root: &Path, ext: &str) -> Result<FixStats> {
    if !root.is_dir() {
        anyhow::bail!("Content directory does not exist: {}", root.display());
    }
    let mut stats = FixStats::default();
    for entry in WalkDir::new(root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                stats.errors.push(e.to_string());
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        stats.scanned += 1;
        match fix_file(path) {
            Ok(true) => {
                tracing::info!("Fixed {}", path.display());
                stats.changed += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("{:#}", e);
                stats.errors.push(format!("{:#}", e));
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_repeated_keys_in_first_block_only() {
        let src = "---\ntitle: A\ndate: 2024-01-01\ntitle: B\ntags:\n  - x\n---\ntitle: body text\ntitle: again\n";
        let fixed = dedupe_front_matter(src).unwrap();
        assert_eq!(
            fixed,
            "---\ntitle: A\ndate: 2024-01-01\ntags:\n  - x\n---\ntitle: body text\ntitle: again\n"
        );
    }

    #[test]
    fn test_later_fenced_blocks_are_not_front_matter() {
        let src = "---\na: 1\n---\n\n---\na: 2\na: 3\n---\n";
        assert!(dedupe_front_matter(src).is_none());
    }

    #[test]
    fn test_files_without_front_matter_are_untouched() {
        assert!(dedupe_front_matter("# Title\ntitle: x\ntitle: y\n").is_none());
        assert!(dedupe_front_matter("").is_none());
        assert!(dedupe_front_matter("---\ntitle: x\n---\n").is_none());
    }

    #[test]
    fn test_crlf_and_indented_lines() {
        let src = "---\r\nkey_1: a\r\n  key_1: nested\r\nkey_1: b\r\n---\r\n";
        let fixed = dedupe_front_matter(src).unwrap();
        assert_eq!(fixed, "---\r\nkey_1: a\r\n  key_1: nested\r\n---\r\n");
    }

    #[test]
    fn test_leading_blank_lines_before_front_matter_are_removed() {
        assert_eq!(
            normalize_layout("\n  \n---\ntitle: x\n---\nbody\n").unwrap(),
            "---\ntitle: x\n---\nbody\n"
        );
        assert_eq!(
            normalize_layout("\u{feff}---\ntitle: x\n---\n").unwrap(),
            "---\ntitle: x\n---\n"
        );
        // Leading whitespace before ordinary content is kept
        assert!(normalize_layout("\n# Title\n").is_none());
        assert!(normalize_layout("---\ntitle: x\n---\n").is_none());
    }

    #[test]
    fn test_missing_trailing_newline_is_added() {
        assert_eq!(normalize_layout("# Title").unwrap(), "# Title\n");
        assert_eq!(normalize_layout("\n---\na: 1\n---").unwrap(), "---\na: 1\n---\n");
        assert!(normalize_layout("").is_none());
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(front_matter_key("title: x"), Some("title"));
        assert_eq!(front_matter_key("og-image:"), Some("og-image"));
        assert_eq!(front_matter_key("  title: x"), None);
        assert_eq!(front_matter_key("no colon"), None);
        assert_eq!(front_matter_key(": x"), None);
    }

    #[test]
    fn test_fix_tree_rewrites_only_markdown_with_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("blog/2024")).unwrap();
        let dup = root.join("blog/2024/post.md");
        let clean = root.join("blog/about.md");
        let other = root.join("blog/notes.txt");
        std::fs::write(&dup, "---\ntitle: a\ntitle: b\n---\nbody\n").unwrap();
        std::fs::write(&clean, "---\ntitle: a\n---\n").unwrap();
        std::fs::write(&other, "---\ntitle: a\ntitle: b\n---\n").unwrap();
        let shifted = root.join("shifted.md");
        std::fs::write(&shifted, "\n\n---\ntitle: a\ntitle: b\n---\nbody").unwrap();

        let stats = fix_tree(root, "md").unwrap();
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.changed, 2);
        // Once moved to the first line, the block is deduplicated in the same pass
        assert_eq!(
            std::fs::read_to_string(&shifted).unwrap(),
            "---\ntitle: a\n---\nbody\n"
        );
        assert!(stats.errors.is_empty());
        assert_eq!(std::fs::read_to_string(&dup).unwrap(), "---\ntitle: a\n---\nbody\n");
        assert_eq!(
            std::fs::read_to_string(&other).unwrap(),
            "---\ntitle: a\ntitle: b\n---\n"
        );
    }

    #[test]
    fn test_fix_tree_requires_existing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(fix_tree(&tmp.path().join("missing"), "md").is_err());
    }
}
