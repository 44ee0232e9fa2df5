// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_hash_map_lookup() {
    let id = TestId::new();
    let mut map = HashMap::new();
    map.insert(id, 42);
    assert_eq!(map.get(id.as_str()), Some(&42));
}

#[test]
fn define_id_has_prefix_and_length() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn define_id_from_string_roundtrips() {
    let s = "tst-abcdefghijklmnopqrs";
    let id = TestId::from_string(s);
    assert_eq!(id.as_str(), s);
    assert_eq!(id.to_string(), s);
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abcdefghijklmnopqrs");
    assert_eq!(id.suffix(), "abcdefghijklmnopqrs");
}

#[test]
fn define_id_short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnopqrs");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn define_id_two_calls_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a, b);
}

#[test]
fn define_id_eq_with_str() {
    let id = TestId::from_string("tst-abcdefghijklmnopqrs");
    assert_eq!(id, *"tst-abcdefghijklmnopqrs");
    assert_eq!(id, "tst-abcdefghijklmnopqrs");
}

// --- short() free function tests ---

#[test]
fn short_fn_truncates() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
}

#[test]
fn short_fn_returns_full_when_shorter() {
    assert_eq!(short("abc", 8), "abc");
}

#[test]
fn short_fn_returns_full_when_exact() {
    assert_eq!(short("abcdefgh", 8), "abcdefgh");
}

// --- IdBuf tests ---

#[test]
fn idbuf_empty_is_empty() {
    assert!(IdBuf::empty().is_empty());
}

#[test]
fn idbuf_debug_and_display_match_as_str() {
    let buf = IdBuf::new("hello");
    assert_eq!(format!("{}", buf), "hello");
    assert_eq!(format!("{:?}", buf), "\"hello\"");
}
