use rdp_sweep::wordlist::{load_list_from_path, parse_list_str};
use std::io::Write;

#[test]
fn parse_skips_blanks_and_comments() {
    let input = "# targets\n10.0.0.1\n\n10.0.0.2\r\n  \n#10.0.0.3\n";
    assert_eq!(parse_list_str(input), vec!["10.0.0.1", "10.0.0.2"]);
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "admin").unwrap();
    writeln!(file, "Administrator").unwrap();
    let entries = load_list_from_path(file.path()).unwrap();
    assert_eq!(entries, vec!["admin", "Administrator"]);
}

#[test]
fn empty_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# nothing here").unwrap();
    assert!(load_list_from_path(file.path()).is_err());
}

#[test]
fn missing_file_rejected() {
    assert!(load_list_from_path("/definitely/not/here.txt").is_err());
}
