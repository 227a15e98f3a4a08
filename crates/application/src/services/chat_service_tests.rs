//! 聊天服务单元测试
//!
//! 使用内存仓储覆盖正常流程，使用 mockall 覆盖存储失败和超时路径。

use std::{sync::Arc, time::Duration};

use domain::{Chat, ChatId, DomainError, ErrorKind, RepositoryError, UserId};

use super::chat_service::*;
use crate::{
    clock::SystemClock,
    error::ApplicationError,
    id_generator::SequentialMessageIdGenerator,
    memory::{InMemoryChatRepository, InMemoryMessageRepository, InMemoryUserRepository},
    repository::{
        ChatRepository, MessageRepository, MockChatRepository, MockMessageRepository,
        MockUserRepository, UserRepository,
    },
};

struct Fixture {
    service: ChatService,
    messages: Arc<InMemoryMessageRepository>,
    chats: Arc<InMemoryChatRepository>,
}

fn fixture() -> Fixture {
    let users = Arc::new(InMemoryUserRepository::new());
    let chats = Arc::new(InMemoryChatRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let service = ChatService::new(ChatServiceDependencies {
        user_repository: users,
        chat_repository: chats.clone(),
        message_repository: messages.clone(),
        clock: Arc::new(SystemClock::default()),
        id_generator: Arc::new(SequentialMessageIdGenerator::new("msg")),
        storage_timeout: Duration::from_secs(1),
    });
    Fixture {
        service,
        messages,
        chats,
    }
}

fn uid(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn cid(id: &str) -> ChatId {
    ChatId::parse(id).unwrap()
}

async fn create_user(service: &ChatService, id: &str, name: &str) -> Result<(), ApplicationError> {
    service
        .create_user(CreateUserRequest {
            id: id.to_string(),
            name: name.to_string(),
        })
        .await
        .map(|_| ())
}

async fn create_chat(
    service: &ChatService,
    id: &str,
    members: &[&str],
) -> Result<Chat, ApplicationError> {
    service
        .create_chat(CreateChatRequest {
            id: id.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        })
        .await
}

async fn send(
    service: &ChatService,
    from: &str,
    chat: &str,
    text: &str,
) -> Result<domain::Message, ApplicationError> {
    service
        .send_message(SendMessageRequest {
            from: uid(from),
            chat_id: cid(chat),
            text: text.to_string(),
        })
        .await
}

/// u1, u2 已注册，c1 = [u1, u2]
async fn seeded() -> Fixture {
    let fx = fixture();
    create_user(&fx.service, "u1", "Amir").await.unwrap();
    create_user(&fx.service, "u2", "Dana").await.unwrap();
    create_chat(&fx.service, "c1", &["u1", "u2"]).await.unwrap();
    fx
}

#[tokio::test]
async fn create_user_rejects_empty_name() {
    let fx = fixture();
    let err = create_user(&fx.service, "u1", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn create_user_twice_is_conflict() {
    let fx = fixture();
    create_user(&fx.service, "u1", "Amir").await.unwrap();
    let err = create_user(&fx.service, "u1", "Bob").await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::UserAlreadyExists(ref id)) if id == "u1"
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn create_chat_with_too_few_members_leaves_no_chat() {
    let fx = fixture();
    create_user(&fx.service, "u1", "Amir").await.unwrap();

    let err = create_chat(&fx.service, "c1", &["u1"]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(fx.chats.find_by_id(&cid("c1")).await.unwrap().is_none());
}

#[tokio::test]
async fn create_chat_with_duplicate_member_is_rejected_before_lookup() {
    let fx = fixture();
    // u9 不存在，但重复检查先于存在性检查
    let err = create_chat(&fx.service, "c1", &["u9", "u9"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(fx.chats.find_by_id(&cid("c1")).await.unwrap().is_none());
}

#[tokio::test]
async fn create_chat_with_unknown_member_is_not_found() {
    let fx = fixture();
    create_user(&fx.service, "u1", "Amir").await.unwrap();

    let err = create_chat(&fx.service, "c1", &["u1", "u2"])
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::UserNotFound)));
    assert!(fx.chats.find_by_id(&cid("c1")).await.unwrap().is_none());
}

#[tokio::test]
async fn create_chat_keeps_supplied_member_order() {
    let fx = fixture();
    for id in ["u1", "u2", "u3"] {
        create_user(&fx.service, id, "name").await.unwrap();
    }
    let chat = create_chat(&fx.service, "c1", &["u3", "u1", "u2"])
        .await
        .unwrap();
    assert_eq!(chat.members, vec![uid("u3"), uid("u1"), uid("u2")]);
}

#[tokio::test]
async fn create_chat_with_taken_id_is_conflict() {
    let fx = seeded().await;
    let err = create_chat(&fx.service, "c1", &["u2", "u1"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn send_message_from_unknown_user() {
    let fx = seeded().await;
    let err = send(&fx.service, "ghost", "c1", "hello").await.unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::UserNotFound)));
}

#[tokio::test]
async fn send_message_to_unknown_chat() {
    let fx = seeded().await;
    let err = send(&fx.service, "u1", "nope", "hello").await.unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::ChatNotFound)));
}

#[tokio::test]
async fn send_message_from_non_member_is_forbidden_and_not_stored() {
    let fx = seeded().await;
    create_user(&fx.service, "u3", "Eve").await.unwrap();

    let err = send(&fx.service, "u3", "c1", "let me in").await.unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::UserNotInChat)));
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(fx.messages.list_by_chat(&cid("c1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn send_then_list_round_trip() {
    let fx = seeded().await;
    let first = send(&fx.service, "u1", "c1", "first").await.unwrap();
    let sent = send(&fx.service, "u2", "c1", "hello").await.unwrap();

    assert_eq!(sent.id.as_str(), "msg-2");
    assert_eq!(sent.from, uid("u2"));
    assert_eq!(sent.chat_id, cid("c1"));

    let listed = fx.service.list_messages(&uid("u1"), &cid("c1")).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1], sent);
    assert!(listed[1].created_at >= first.created_at);
}

#[tokio::test]
async fn empty_text_is_allowed() {
    let fx = seeded().await;
    let message = send(&fx.service, "u1", "c1", "").await.unwrap();
    assert_eq!(message.text, "");
}

#[tokio::test]
async fn list_messages_requires_membership() {
    let fx = seeded().await;
    send(&fx.service, "u1", "c1", "secret").await.unwrap();

    // 请求者不存在也只报告成员关系错误
    let err = fx
        .service
        .list_messages(&uid("stranger"), &cid("c1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = fx
        .service
        .list_messages(&uid("u1"), &cid("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::ChatNotFound)));
}

#[tokio::test]
async fn list_user_chats_only_returns_member_chats() {
    let fx = seeded().await;
    create_user(&fx.service, "u3", "Eve").await.unwrap();
    create_chat(&fx.service, "c2", &["u2", "u3"]).await.unwrap();

    let chats = fx.service.list_user_chats(&uid("u1")).await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, cid("c1"));

    let chats = fx.service.list_user_chats(&uid("u2")).await.unwrap();
    assert_eq!(chats.len(), 2);

    let err = fx.service.list_user_chats(&uid("ghost")).await.unwrap_err();
    assert!(matches!(err, ApplicationError::Domain(DomainError::UserNotFound)));
}

#[tokio::test]
async fn get_chat_by_id() {
    let fx = seeded().await;
    let chat = fx.service.get_chat(&cid("c1")).await.unwrap();
    assert_eq!(chat.members, vec![uid("u1"), uid("u2")]);

    let err = fx.service.get_chat(&cid("c9")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn documented_scenario() {
    let fx = fixture();
    create_user(&fx.service, "u1", "Amir").await.unwrap();
    assert_eq!(
        create_user(&fx.service, "u1", "Bob").await.unwrap_err().kind(),
        ErrorKind::Conflict
    );
    assert_eq!(
        create_chat(&fx.service, "c1", &["u1"]).await.unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        create_chat(&fx.service, "c1", &["u1", "u2"])
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    create_user(&fx.service, "u2", "Dana").await.unwrap();
    create_chat(&fx.service, "c1", &["u1", "u2"]).await.unwrap();
    send(&fx.service, "u2", "c1", "hey").await.unwrap();

    let listed = fx.service.list_messages(&uid("u1"), &cid("c1")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text, "hey");
}

fn mocked_service(
    users: MockUserRepository,
    chats: MockChatRepository,
    messages: MockMessageRepository,
    timeout: Duration,
) -> ChatService {
    ChatService::new(ChatServiceDependencies {
        user_repository: Arc::new(users),
        chat_repository: Arc::new(chats),
        message_repository: Arc::new(messages),
        clock: Arc::new(SystemClock::default()),
        id_generator: Arc::new(SequentialMessageIdGenerator::new("msg")),
        storage_timeout: timeout,
    })
}

#[tokio::test]
async fn storage_failure_surfaces_as_unavailable() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_id()
        .returning(|_| Err(RepositoryError::storage("connection refused")));

    let service = mocked_service(
        users,
        MockChatRepository::new(),
        MockMessageRepository::new(),
        Duration::from_secs(1),
    );

    let err = service.list_user_chats(&uid("u1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

/// 永远不返回的用户仓储，模拟挂起的存储
struct HungUserRepository;

#[async_trait::async_trait]
impl UserRepository for HungUserRepository {
    async fn create(&self, _user: domain::User) -> Result<domain::User, RepositoryError> {
        std::future::pending().await
    }

    async fn find_by_id(&self, _id: &UserId) -> Result<Option<domain::User>, RepositoryError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn hung_storage_times_out() {
    let service = ChatService::new(ChatServiceDependencies {
        user_repository: Arc::new(HungUserRepository),
        chat_repository: Arc::new(InMemoryChatRepository::new()),
        message_repository: Arc::new(InMemoryMessageRepository::new()),
        clock: Arc::new(SystemClock::default()),
        id_generator: Arc::new(SequentialMessageIdGenerator::new("msg")),
        storage_timeout: Duration::from_millis(200),
    });

    let err = send(&service, "u1", "c1", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Unavailable {
            operation: "find_user"
        }
    ));
}

#[tokio::test]
async fn message_is_not_written_when_membership_check_fails() {
    let mut users = MockUserRepository::new();
    users.expect_find_by_id().returning(|id| {
        Ok(Some(domain::User::new(
            id.clone(),
            domain::UserName::parse("someone").unwrap(),
        )))
    });

    let mut chats = MockChatRepository::new();
    chats.expect_find_by_id().returning(|id| {
        Ok(Some(
            Chat::new(id.clone(), vec![uid("a"), uid("b")]).unwrap(),
        ))
    });

    let mut messages = MockMessageRepository::new();
    messages.expect_create().never();

    let service = mocked_service(users, chats, messages, Duration::from_secs(1));
    let err = send(&service, "c", "room", "hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn message_id_collision_is_conflict() {
    let mut users = MockUserRepository::new();
    users.expect_find_by_id().returning(|id| {
        Ok(Some(domain::User::new(
            id.clone(),
            domain::UserName::parse("someone").unwrap(),
        )))
    });

    let mut chats = MockChatRepository::new();
    chats.expect_find_by_id().returning(|id| {
        Ok(Some(
            Chat::new(id.clone(), vec![uid("a"), uid("b")]).unwrap(),
        ))
    });

    let mut messages = MockMessageRepository::new();
    messages
        .expect_create()
        .times(1)
        .returning(|_| Err(RepositoryError::Conflict));

    let service = mocked_service(users, chats, messages, Duration::from_secs(1));
    let err = send(&service, "a", "room", "hi").await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::MessageAlreadyExists(_))
    ));
}
