use super::*;
use crate::DiscoveryError;
use crate::Error;

#[test]
fn test_join_path_drops_empty_segments() {
    assert_eq!(join_path(["", "discovery/service", "nodes"]), "discovery/service/nodes");
    assert_eq!(join_path(["root/", "/discovery//service/", "nodes"]), "root/discovery/service/nodes");
    assert_eq!(join_path(["a", ".", "b", "..", "c"]), "a/c");
    assert_eq!(join_path(Vec::<String>::new()), "");
}

#[test]
fn test_parse_uris_without_prefix() {
    let (endpoints, prefix) = parse_uris("10.0.0.1:2379,10.0.0.2:2379").unwrap();
    assert_eq!(endpoints, vec!["10.0.0.1:2379", "10.0.0.2:2379"]);
    assert_eq!(prefix, "");
}

#[test]
fn test_parse_uris_with_prefix() {
    let (endpoints, prefix) = parse_uris("10.0.0.1:2379/cluster/a").unwrap();
    assert_eq!(endpoints, vec!["10.0.0.1:2379"]);
    assert_eq!(prefix, "cluster/a");
}

#[test]
fn test_parse_uris_rejects_missing_hosts() {
    match parse_uris("/only/prefix") {
        Err(Error::Discovery(DiscoveryError::InvalidUri(uri))) => assert_eq!(uri, "/only/prefix"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(parse_uris(" , ").is_err());
}

#[test]
fn test_is_descendant() {
    assert!(is_descendant("a/nodes", "a/nodes/n1"));
    assert!(is_descendant("a/nodes", "a/nodes/n1/extra"));
    assert!(!is_descendant("a/nodes", "a/nodes"));
    assert!(!is_descendant("a/nodes", "a/nodes2/n1"));
    assert!(!is_descendant("a/nodes", "a/nodes/"));
    assert!(is_descendant("", "x"));
}
