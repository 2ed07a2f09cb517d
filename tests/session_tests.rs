use leadgate::session::*;
use std::time::Duration;

#[test]
fn test_generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(token, generate_token());
}

#[test]
fn test_tokens_match() {
    assert!(tokens_match("abc123", "abc123"));
    assert!(!tokens_match("abc123", "abc124"));
    assert!(!tokens_match("abc123", "abc12"));
    assert!(!tokens_match("abc123", ""));
    assert!(tokens_match("", ""));
}

#[test]
fn test_session_is_reused_with_same_token() {
    let store = SessionStore::new(Duration::from_secs(60), 100);
    let first = store.get_or_create(None);
    let again = store.get_or_create(Some(&first.id));
    assert_eq!(first, again);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_unknown_session_id_starts_fresh() {
    let store = SessionStore::new(Duration::from_secs(60), 100);
    let ctx = store.get_or_create(Some("forged-id"));
    assert_ne!(ctx.id, "forged-id");
    assert_eq!(ctx.csrf_token.len(), 64);
}

#[test]
fn test_token_survives_until_rotated() {
    let store = SessionStore::new(Duration::from_secs(60), 100);
    let ctx = store.get_or_create(None);
    for _ in 0..3 {
        assert_eq!(store.get_or_create(Some(&ctx.id)).csrf_token, ctx.csrf_token);
    }

    let rotated = store.rotate(&ctx.id).unwrap();
    assert_ne!(rotated, ctx.csrf_token);
    assert_eq!(store.get_or_create(Some(&ctx.id)).csrf_token, rotated);
    assert!(store.rotate("missing").is_none());
}

#[test]
fn test_expired_sessions_are_dropped() {
    let store = SessionStore::new(Duration::ZERO, 100);
    let ctx = store.get_or_create(None);
    let next = store.get_or_create(Some(&ctx.id));
    assert_ne!(next.id, ctx.id);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_never_grows_past_its_limit() {
    let store = SessionStore::new(Duration::from_secs(60), 50);
    for _ in 0..5_000 {
        store.get_or_create(None);
    }
    assert_eq!(store.len(), 50);
}

#[test]
fn test_limit_evicts_least_recently_seen() {
    let store = SessionStore::new(Duration::from_secs(60), 2);
    let old = store.get_or_create(None);
    let recent = store.get_or_create(None);
    // touching `old` makes `recent` the eviction candidate
    store.get_or_create(Some(&old.id));
    store.get_or_create(None);

    assert_eq!(store.len(), 2);
    assert_eq!(store.get_or_create(Some(&old.id)), old);
    assert_ne!(store.get_or_create(Some(&recent.id)).id, recent.id);
}
