use rdp_sweep::targets::expand_targets;

#[test]
fn cidr_entries_expand_in_place() {
    let entries = vec![
        "192.168.7.10".to_string(),
        "10.0.0.0/30".to_string(),
        "::1".to_string(),
    ];
    let out = expand_targets(&entries).expect("expand ok");
    assert_eq!(out, vec!["192.168.7.10", "10.0.0.1", "10.0.0.2", "::1"]);
}

#[test]
fn malformed_cidr_rejected() {
    assert!(expand_targets(&["10.0.0.0/abc".to_string()]).is_err());
}
