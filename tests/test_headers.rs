//! Tests for the ordered, case-insensitive header multi-map

use warden::http::headers::HeaderMap;

#[test]
fn test_get_is_case_insensitive() {
    let mut headers = HeaderMap::new();
    headers.append("Content-Type", "text/plain");

    assert_eq!(headers.get("content-type"), Some("text/plain"));
    assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    assert!(headers.contains("cOnTeNt-TyPe"));
    assert_eq!(headers.get("Content-Length"), None);
}

#[test]
fn test_append_preserves_order_and_duplicates() {
    let mut headers = HeaderMap::new();
    headers.append("Set-Cookie", "a=1");
    headers.append("X-Other", "x");
    headers.append("Set-Cookie", "b=2");

    let order: Vec<_> = headers.iter().collect();
    assert_eq!(
        order,
        vec![("Set-Cookie", "a=1"), ("X-Other", "x"), ("Set-Cookie", "b=2")]
    );

    // get returns the first value, get_all returns every one in order
    assert_eq!(headers.get("set-cookie"), Some("a=1"));
    let all: Vec<_> = headers.get_all("set-cookie").collect();
    assert_eq!(all, vec!["a=1", "b=2"]);
}

#[test]
fn test_insert_replaces_all_values() {
    let mut headers = HeaderMap::new();
    headers.append("X-Tag", "one");
    headers.append("Host", "example.com");
    headers.append("x-tag", "two");

    headers.insert("X-Tag", "final");

    let all: Vec<_> = headers.get_all("X-Tag").collect();
    assert_eq!(all, vec!["final"]);
    // Replacement keeps the position of the first removed entry
    let order: Vec<_> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(order, vec!["X-Tag", "Host"]);
}

#[test]
fn test_remove() {
    let mut headers = HeaderMap::new();
    headers.append("Connection", "keep-alive");
    headers.append("connection", "close");
    headers.append("Host", "example.com");

    headers.remove("CONNECTION");

    assert!(!headers.contains("Connection"));
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get("Host"), Some("example.com"));
}

#[test]
fn test_empty_map() {
    let headers = HeaderMap::new();
    assert!(headers.is_empty());
    assert_eq!(headers.len(), 0);
    assert_eq!(headers.get("anything"), None);
}

#[test]
fn test_from_iterator() {
    let headers: HeaderMap = vec![("A", "1"), ("B", "2"), ("A", "3")].into_iter().collect();

    assert_eq!(headers.len(), 3);
    let all: Vec<_> = headers.get_all("a").collect();
    assert_eq!(all, vec!["1", "3"]);
}
