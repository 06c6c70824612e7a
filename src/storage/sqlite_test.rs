use super::*;
use chrono::{Duration, Utc};
use tempfile::TempDir;

async fn open(dir: &TempDir) -> SqliteStorage {
    let path = dir.path().join("myq-home.db");
    SqliteStorage::new(path.to_str().unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/dir/myq-home.db");
    SqliteStorage::new(path.to_str().unwrap()).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_rejects_path_traversal() {
    let result = SqliteStorage::new("../outside.db").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let storage = open(&temp_dir).await;
        let user = User::upserted(None, "a@b.com", "hash".into(), "token".into());
        storage.upsert_user(&user).await.unwrap();
    }

    let storage = open(&temp_dir).await;
    let user = storage.find_user_by_username("a@b.com").await.unwrap();
    assert_eq!(user.map(|u| u.security_token), Some("token".to_string()));
}

#[tokio::test]
async fn test_token_without_refresh() {
    let temp_dir = TempDir::new().unwrap();
    let storage = open(&temp_dir).await;
    let token = OAuthToken {
        id: "t".into(),
        client_id: "c".into(),
        user_id: "a@b.com".into(),
        scope: String::new(),
        access: "access-only".into(),
        access_expires_at: Utc::now() + Duration::seconds(60),
        refresh: None,
        refresh_expires_at: None,
    };
    storage.save_token(&token).await.unwrap();

    let found = storage.find_token("access-only").await.unwrap().unwrap();
    assert!(found.refresh.is_none());
    assert!(found.refresh_expires_at.is_none());
}
