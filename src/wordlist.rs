use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Parse newline-delimited list content into entries, in file order.
///
/// - trailing `\r` is stripped (CRLF files)
/// - blank and whitespace-only lines are skipped
/// - lines starting with `#` are comments
/// - everything else is kept verbatim, including inner and surrounding spaces
pub fn parse_list_str(s: &str) -> Vec<String> {
    s.lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load a list from a file path. Errors if the file cannot be read or has no entries.
pub fn load_list_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("failed to read list file: {}", path.display()))?;
    let entries = parse_list_str(&String::from_utf8_lossy(&bytes));
    if entries.is_empty() {
        bail!("list file has no entries: {}", path.display());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_lines() {
        let entries = parse_list_str("admin\nroot\n   \nguest\n");
        assert_eq!(entries, vec!["admin", "root", "guest"]);
    }

    #[test]
    fn crlf_and_comments() {
        let entries = parse_list_str("# users\r\nadmin\r\n#root\r\n\r\nguest\r\n");
        assert_eq!(entries, vec!["admin", "guest"]);
    }

    #[test]
    fn spaces_are_kept() {
        let entries = parse_list_str("correct horse \n pass\n");
        assert_eq!(entries, vec!["correct horse ", " pass"]);
    }
}
