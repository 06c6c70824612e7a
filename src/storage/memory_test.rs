use super::*;
use chrono::{Duration, Utc};

fn code(code: &str) -> AuthorizationCode {
    AuthorizationCode {
        code: code.to_string(),
        client_id: "client".to_string(),
        user_id: "a@b.com".to_string(),
        redirect_uri: "https://example.com/cb".to_string(),
        scope: "devices".to_string(),
        expires_at: Utc::now() + Duration::seconds(300),
    }
}

#[tokio::test]
async fn test_upsert_preserves_created_at() {
    let storage = MemoryStorage::new();
    let first = User::upserted(None, "a@b.com", "h1".into(), "t1".into());
    storage.upsert_user(&first).await.unwrap();

    let mut second = User::upserted(None, "a@b.com", "h2".into(), "t2".into());
    second.created_at = first.created_at + Duration::days(1);
    storage.upsert_user(&second).await.unwrap();

    let stored = storage.find_user_by_username("a@b.com").await.unwrap().unwrap();
    assert_eq!(stored.created_at, first.created_at);
    assert_eq!(stored.password_hash, "h2");
}

#[tokio::test]
async fn test_concurrent_take_code_single_winner() {
    let storage = MemoryStorage::new();
    storage.save_code(&code("race")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let s = storage.clone();
        handles.push(tokio::spawn(async move { s.take_code("race").await.unwrap() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one redemption may succeed");
}

#[tokio::test]
async fn test_clones_share_state() {
    let storage = MemoryStorage::new();
    let clone = storage.clone();
    storage.save_code(&code("shared")).await.unwrap();
    assert!(clone.find_code("shared").await.unwrap().is_some());
}
