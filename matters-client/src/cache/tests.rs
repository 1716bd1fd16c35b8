use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use super::*;

fn article(title: &str) -> Value {
    json!({
        "article": {
            "__typename": "Article",
            "id": "1",
            "title": title,
            "author": { "__typename": "User", "id": "u1", "displayName": "Matty" },
            "tags": [{ "__typename": "Tag", "id": 7, "content": "rust" }],
            "summary": { "text": "inline" }
        }
    })
}

#[test]
fn it_normalizes_entities_into_references() {
    let cache = NormalizedCache::default();
    let written = cache.write_result(RootType::Query, &article("Hello"));

    assert_eq!(written, vec!["ROOT_QUERY", "User:u1", "Tag:7", "Article:1"]);
    assert_eq!(
        Value::Object(cache.read_entity("Article:1").expect("stored")),
        json!({
            "__typename": "Article",
            "id": "1",
            "title": "Hello",
            "author": { "__ref": "User:u1" },
            "tags": [{ "__ref": "Tag:7" }],
            "summary": { "text": "inline" }
        })
    );
    assert_eq!(
        Value::Object(cache.read_entity(ROOT_QUERY).expect("stored")),
        json!({ "__typename": "Query", "article": { "__ref": "Article:1" } })
    );

    let mut expected = article("Hello");
    expected
        .as_object_mut()
        .expect("object")
        .insert("__typename", json!("Query"));
    assert_eq!(cache.read_root(RootType::Query), Some(expected));
}

#[test]
fn writes_merge_fields_of_the_same_entity() {
    let cache = NormalizedCache::default();
    cache.write_result(RootType::Query, &article("Hello"));
    cache.write_result(
        RootType::Query,
        &json!({ "viewer": { "__typename": "User", "id": "u1", "userName": "matty" } }),
    );

    let user = cache.read_entity("User:u1").expect("stored");
    assert_eq!(user.get("displayName"), Some(&json!("Matty")));
    assert_eq!(user.get("userName"), Some(&json!("matty")));
    assert_eq!(cache.len(), 4);
}

#[test]
fn snapshots_restore_before_first_access_only() {
    let server = NormalizedCache::default();
    server.write_result(RootType::Query, &article("Hello"));
    let snapshot = server.extract();

    let browser = NormalizedCache::default();
    browser.restore(snapshot.clone()).expect("fresh cache");
    assert_eq!(browser.extract(), snapshot);
    assert_eq!(
        browser.restore(snapshot),
        Err(CacheError::RestoreAfterAccess)
    );

    let empty = NormalizedCache::default();
    empty.restore(Value::Null).expect("no initial state");
    assert!(empty.is_empty());
}

#[test]
fn invalid_snapshots_are_rejected() {
    let cache = NormalizedCache::default();
    assert_eq!(
        cache.restore(json!([1])),
        Err(CacheError::InvalidSnapshot("an array".to_string()))
    );
    assert_eq!(
        cache.restore(json!({ "User:1": "nope" })),
        Err(CacheError::InvalidSnapshot("a string".to_string()))
    );
}

#[test]
fn optimistic_layers_are_visible_until_rolled_back() {
    let cache = NormalizedCache::default();
    cache.write_result(
        RootType::Query,
        &json!({ "user": { "__typename": "User", "id": "u1", "isFollowee": false } }),
    );

    cache.record_optimistic(
        "toggle-follow",
        RootType::Mutation,
        &json!({ "toggleFollow": { "__typename": "User", "id": "u1", "isFollowee": true } }),
    );
    assert_eq!(
        cache.read_entity("User:u1").expect("stored").get("isFollowee"),
        Some(&json!(true))
    );
    assert_eq!(cache.optimistic_layers(), 1);

    cache
        .rollback_optimistic("toggle-follow")
        .expect("known layer");
    assert_eq!(
        cache.read_entity("User:u1").expect("stored").get("isFollowee"),
        Some(&json!(false))
    );
    assert_eq!(
        cache.rollback_optimistic("toggle-follow"),
        Err(CacheError::UnknownOptimisticLayer("toggle-follow".to_string()))
    );
}

#[test]
fn committing_replaces_the_optimistic_guess_with_the_real_result() {
    let cache = NormalizedCache::default();
    cache.write_result(
        RootType::Query,
        &json!({ "user": { "__typename": "User", "id": "u1", "displayName": "Matty", "followers": 1 } }),
    );

    cache.record_optimistic(
        "toggle-follow",
        RootType::Mutation,
        &json!({ "toggleFollow": { "__typename": "User", "id": "u1", "isFollowee": true, "followers": 2 } }),
    );
    cache.commit_optimistic(
        "toggle-follow",
        RootType::Mutation,
        &json!({ "toggleFollow": { "__typename": "User", "id": "u1", "followers": 5 } }),
    );

    assert_eq!(cache.optimistic_layers(), 0);
    assert_eq!(
        Value::Object(cache.read_entity("User:u1").expect("stored")),
        json!({ "__typename": "User", "id": "u1", "displayName": "Matty", "followers": 5 })
    );
    let snapshot = cache.extract();
    let keys: Vec<_> = snapshot
        .as_object()
        .expect("object")
        .keys()
        .map(|key| key.as_str().to_string())
        .collect();
    assert_eq!(keys, vec!["ROOT_QUERY", "User:u1", "ROOT_MUTATION"]);
}

#[test]
fn fragments_match_through_possible_types() {
    let mut possible_types = PossibleTypes::default();
    possible_types.insert("Node", "Article");
    let cache = NormalizedCache::new(possible_types);
    cache.write_result(RootType::Query, &article("Hello"));

    let node = cache.read_fragment("Article:1", "Node").expect("articles are nodes");
    assert_eq!(node["author"]["displayName"], json!("Matty"));
    assert_eq!(cache.read_fragment("Article:1", "Comment"), None);
    assert_eq!(cache.read_fragment("Article:2", "Node"), None);
}

#[test]
fn self_references_do_not_recurse_forever() {
    let cache = NormalizedCache::default();
    cache.write_result(
        RootType::Query,
        &json!({
            "viewer": {
                "__typename": "User",
                "id": "u1",
                "following": [{ "__typename": "User", "id": "u1" }]
            }
        }),
    );

    let viewer = cache.resolve(&json!({ "__ref": "User:u1" }));
    assert_eq!(viewer["following"], json!([{ "__ref": "User:u1" }]));
    assert_eq!(cache.resolve(&json!({ "__ref": "User:404" })), Value::Null);
}

#[test]
fn concurrent_writers_are_serialized() {
    let cache = Arc::new(NormalizedCache::default());
    let writers: Vec<_> = (0..8)
        .map(|index| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                cache.write_result(
                    RootType::Query,
                    &json!({ "user": { "__typename": "User", "id": "u1", format!("field{index}"): index } }),
                );
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer panicked");
    }

    let user = cache.read_entity("User:u1").expect("stored");
    for index in 0..8 {
        assert_eq!(user.get(format!("field{index}").as_str()), Some(&json!(index)));
    }
}
