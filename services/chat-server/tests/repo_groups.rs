//! Group gateway invariants against real MySQL and Redis.
//!
//! These suites need Docker and are ignored by default:
//! `cargo test -- --ignored` runs them.

use chat_server::cache::Cache;
use chat_server::repo::{
    self, ContactKind, GroupAddMode, GroupRecord, GroupStatus, MessageStatus, UserRecord,
    UserStatus,
};
use chat_protocol::MessageType;
use sqlx::MySqlPool;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::redis::Redis;

async fn test_env() -> (
    testcontainers::ContainerAsync<Mysql>,
    testcontainers::ContainerAsync<Redis>,
    MySqlPool,
    Cache,
) {
    let mysql = Mysql::default().start().await.unwrap();
    let mysql_port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let pool = chat_server::db::create_pool(&format!("mysql://root@127.0.0.1:{mysql_port}/test"))
        .await
        .unwrap();
    chat_server::db::run_migrations(&pool).await.unwrap();

    let redis = Redis::default().start().await.unwrap();
    let redis_port = redis.get_host_port_ipv4(6379).await.unwrap();
    let cache = Cache::connect(&format!("redis://127.0.0.1:{redis_port}"))
        .await
        .unwrap();

    (mysql, redis, pool, cache)
}

fn group(uuid: &str, owner: &str, members: &[&str]) -> GroupRecord {
    GroupRecord {
        uuid: uuid.to_owned(),
        name: "weekend hikes".to_owned(),
        notice: String::new(),
        owner_id: owner.to_owned(),
        add_mode: GroupAddMode::Direct,
        member_ids: members.iter().map(|&member| member.to_owned()).collect(),
        member_count: members.len() as i64,
        avatar: "/static/avatars/g.png".to_owned(),
        status: GroupStatus::Normal,
        created_at: chrono::Utc::now().naive_utc(),
    }
}

fn user(uuid: &str, nickname: &str) -> UserRecord {
    UserRecord {
        uuid: uuid.to_owned(),
        nickname: nickname.to_owned(),
        telephone: String::new(),
        avatar: "/static/avatars/u.png".to_owned(),
        status: UserStatus::Normal,
        is_admin: false,
    }
}

async fn assert_member_invariant(pool: &MySqlPool, group_id: &str) {
    let group = repo::groups::load_group(pool, group_id)
        .await
        .unwrap()
        .expect("group exists");
    assert_eq!(group.member_count, group.member_ids.len() as i64);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn member_count_tracks_the_member_list() {
    let (_mysql, _redis, pool, cache) = test_env().await;
    repo::groups::insert_group(&pool, &group("G001", "U001", &["U001"]))
        .await
        .unwrap();

    repo::groups::append_group_member(&pool, &cache, "G001", "U002")
        .await
        .unwrap();
    assert_member_invariant(&pool, "G001").await;

    repo::groups::append_group_member(&pool, &cache, "G001", "U003")
        .await
        .unwrap();
    // Appending an existing member is a no-op, not a duplicate.
    repo::groups::append_group_member(&pool, &cache, "G001", "U003")
        .await
        .unwrap();
    assert_member_invariant(&pool, "G001").await;

    repo::groups::remove_group_member(&pool, &cache, "G001", "U002")
        .await
        .unwrap();
    assert_member_invariant(&pool, "G001").await;

    let group = repo::groups::load_group(&pool, "G001").await.unwrap().unwrap();
    assert_eq!(group.member_ids, vec!["U001".to_owned(), "U003".to_owned()]);
    assert_eq!(group.member_count, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn leave_then_reenter_restores_the_member_count() {
    let (_mysql, _redis, pool, cache) = test_env().await;
    repo::groups::insert_group(&pool, &group("G001", "U001", &["U001", "U002", "U003"]))
        .await
        .unwrap();

    let before = repo::groups::load_group(&pool, "G001")
        .await
        .unwrap()
        .unwrap()
        .member_count;

    repo::groups::remove_group_member(&pool, &cache, "G001", "U003")
        .await
        .unwrap();
    repo::groups::append_group_member(&pool, &cache, "G001", "U003")
        .await
        .unwrap();

    let after = repo::groups::load_group(&pool, "G001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.member_count, before);
    assert_member_invariant(&pool, "G001").await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn dissolution_cascades_to_sessions_contacts_and_applies() {
    let (_mysql, _redis, pool, cache) = test_env().await;
    repo::users::insert_user(&pool, &user("U001", "alice")).await.unwrap();
    repo::users::insert_user(&pool, &user("U002", "bob")).await.unwrap();
    repo::groups::insert_group(&pool, &group("G001", "U001", &["U001", "U002"]))
        .await
        .unwrap();

    repo::contacts::insert_contact(&pool, "U001", "G001", ContactKind::Group)
        .await
        .unwrap();
    repo::contacts::insert_contact(&pool, "U002", "G001", ContactKind::Group)
        .await
        .unwrap();
    repo::contacts::upsert_apply(&pool, "U003", "G001", ContactKind::Group, "let me in")
        .await
        .unwrap();
    repo::sessions::create_session(&pool, &cache, "U001", "G001")
        .await
        .unwrap();

    repo::groups::dismiss_group(&pool, &cache, "G001").await.unwrap();

    assert!(repo::groups::load_group(&pool, "G001").await.unwrap().is_none());
    assert!(repo::groups::group_members(&pool, "G001").await.unwrap().is_empty());
    assert!(
        repo::sessions::list_group_sessions(&pool, "U001")
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        repo::contacts::get_contact(&pool, "U001", "G001")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        repo::contacts::get_apply(&pool, "U003", "G001")
            .await
            .unwrap()
            .is_none()
    );

    // Dismissing twice is a user-visible failure, not a crash.
    let err = repo::groups::dismiss_group(&pool, &cache, "G001")
        .await
        .unwrap_err();
    assert!(matches!(err, chat_server::error::ChatError::UserVisible(_)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn messages_transition_unsent_to_sent_and_histories_stay_ordered() {
    let (_mysql, _redis, pool, _cache) = test_env().await;

    let base = chrono::Utc::now().naive_utc();
    for (offset, content) in [(0, "first"), (1, "second")] {
        let record = repo::MessageRecord {
            uuid: format!("M00000000000{offset}"),
            session_id: "S001".to_owned(),
            kind: MessageType::Text,
            content: content.to_owned(),
            url: String::new(),
            send_id: "U001".to_owned(),
            send_name: "alice".to_owned(),
            send_avatar: "/static/avatars/a.png".to_owned(),
            receive_id: "U002".to_owned(),
            file_size: "0B".to_owned(),
            file_type: String::new(),
            file_name: String::new(),
            status: MessageStatus::Unsent,
            av_payload: String::new(),
            created_at: base + chrono::Duration::seconds(offset),
        };
        repo::messages::insert_message(&pool, &record).await.unwrap();
    }

    let stored = repo::messages::load_message(&pool, "M000000000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, MessageStatus::Unsent);

    repo::messages::mark_message_sent(&pool, "M000000000000")
        .await
        .unwrap();
    let sent = repo::messages::load_message(&pool, "M000000000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);

    let history = repo::messages::load_direct_history(&pool, "U002", "U001")
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
    assert_eq!(history[1].content, "second");
}
