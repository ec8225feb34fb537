use actix_web::web;

pub mod auth;
pub mod chat;
pub mod conversation;
pub mod health;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::ping).service(
        web::scope("/api")
            .service(auth::register)
            .service(auth::login)
            .service(auth::logout)
            .service(auth::check_auth)
            .service(chat::chat)
            .service(conversation::list_conversations)
            .service(conversation::new_conversation)
            .service(conversation::get_conversation_messages)
            .service(conversation::rename_conversation)
            .service(conversation::delete_conversation),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::body::MessageBody;
    use actix_web::cookie::Cookie;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::{header, StatusCode};
    use actix_web::test::{self, TestRequest};
    use serde_json::json;
    use uuid::Uuid;

    use crate::db::memory_pool;
    use crate::error::ApiError;
    use crate::llm::testing::ScriptedModel;
    use crate::middleware::auth::SESSION_COOKIE;
    use crate::models::{Conversation, Message, User};
    use crate::orchestrator::{ChatOrchestrator, ChatSettings, Reply};
    use crate::prompts::Prompts;
    use crate::types::{
        AuthStatusResponse, ChatResponse, ConversationSummary, MessageView,
        NewConversationResponse, StatusResponse,
    };
    use crate::{create_app, AppConfig, AppState};

    async fn test_state() -> (Arc<AppConfig>, Arc<AppState>, Arc<ScriptedModel>) {
        let app_config = AppConfig::from_lookup(|key| match key {
            "LLM_API_KEY" => Some("test-key".to_string()),
            "JWT_SECRET" => Some("test-secret".to_string()),
            _ => None,
        })
        .unwrap();

        let model = Arc::new(ScriptedModel::default());
        let orchestrator = ChatOrchestrator::new(
            model.clone(),
            "RULES + CORPUS",
            &ChatSettings::from(&app_config),
        )
        .unwrap();

        let app_state = AppState {
            pool: memory_pool().await,
            orchestrator: Arc::new(orchestrator),
        };
        (Arc::new(app_config), Arc::new(app_state), model)
    }

    fn credentials(path: &str, username: &str, password: &str) -> TestRequest {
        TestRequest::post()
            .uri(path)
            .set_json(json!({ "username": username, "password": password }))
    }

    fn session_from<B>(resp: &ServiceResponse<B>) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.into_owned())
            .expect("response sets the session cookie")
    }

    async fn json_body<B: MessageBody>(resp: ServiceResponse<B>) -> serde_json::Value {
        test::read_body_json(resp).await
    }

    /// Registers `$username` and returns the session cookie of a fresh login.
    macro_rules! login {
        ($app:expr, $username:expr) => {{
            let resp = test::call_service(
                &$app,
                credentials("/api/register", $username, "secret").to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);

            let resp = test::call_service(
                &$app,
                credentials("/api/login", $username, "secret").to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
            session_from(&resp)
        }};
    }

    #[actix_web::test]
    async fn ping_answers_with_no_cache_headers() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;

        let resp = test::call_service(&app, TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(resp.headers().get(header::PRAGMA).unwrap(), "no-cache");
        assert_eq!(resp.headers().get(header::EXPIRES).unwrap(), "0");
        assert_eq!(json_body(resp).await, json!({ "status": "ok" }));
    }

    #[actix_web::test]
    async fn login_establishes_session_for_check_auth() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;

        let resp = test::call_service(&app, TestRequest::get().uri("/api/check_auth").to_request()).await;
        let status: AuthStatusResponse = test::read_body_json(resp).await;
        assert!(!status.is_logged_in);
        assert!(status.username.is_none());

        let session = login!(app, "thisinh01");
        assert!(session.http_only().unwrap_or(false));

        let req = TestRequest::get()
            .uri("/api/check_auth")
            .cookie(session)
            .to_request();
        let status: AuthStatusResponse = test::call_and_read_body_json(&app, req).await;
        assert!(status.is_logged_in);
        assert_eq!(status.username.as_deref(), Some("thisinh01"));
    }

    #[actix_web::test]
    async fn duplicate_registration_is_rejected() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;

        let first = test::call_service(&app, credentials("/api/register", "an", "pw1").to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = test::call_service(&app, credentials("/api/register", "an", "pw2").to_request()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body: StatusResponse = test::read_body_json(second).await;
        assert!(!body.success);
        assert_eq!(body.message.as_deref(), Some("Username already exists"));

        // The original password still works
        let user = User::get_by_username(&app_state.pool, "an").await.unwrap().unwrap();
        assert!(user.verify_password("pw1"));
    }

    #[actix_web::test]
    async fn registration_requires_both_fields() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;

        let resp = test::call_service(&app, credentials("/api/register", "  ", "pw").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, credentials("/api/register", "binh", "").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: StatusResponse = test::read_body_json(resp).await;
        assert!(!body.success);
    }

    #[actix_web::test]
    async fn wrong_password_is_unauthorized() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;
        login!(app, "chi");

        let resp = test::call_service(&app, credentials("/api/login", "chi", "nope").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp
            .response()
            .cookies()
            .all(|cookie| cookie.name() != SESSION_COOKIE));

        let resp = test::call_service(&app, credentials("/api/login", "ghost", "secret").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_clears_the_session_cookie() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;
        let session = login!(app, "dung");

        let req = TestRequest::post().uri("/api/logout").cookie(session).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cleared = session_from(&resp);
        assert!(cleared.value().is_empty());
        assert_eq!(cleared.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
    }

    #[actix_web::test]
    async fn protected_routes_require_a_session() {
        let (app_config, app_state, model) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;

        let requests = vec![
            TestRequest::get().uri("/api/conversations"),
            TestRequest::post().uri("/api/conversation/new"),
            TestRequest::post()
                .uri("/api/chat")
                .set_json(json!({ "message": "Học phí?" })),
        ];
        for req in requests {
            let resp = test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }

        let forged = Cookie::new(SESSION_COOKIE, "not-a-token");
        let req = TestRequest::get()
            .uri("/api/conversations")
            .cookie(forged)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(model.request_count(), 0);
    }

    #[actix_web::test]
    async fn chat_without_conversation_starts_one() {
        let (app_config, app_state, model) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let session = login!(app, "em");

        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session.clone())
            .set_json(json!({ "message": "Điểm chuẩn ngành AI" }))
            .to_request();
        let reply: ChatResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(
            reply.response.trim(),
            "<p><strong>echo:</strong> Điểm chuẩn ngành AI</p>"
        );
        assert_eq!(reply.new_title.as_deref(), Some("Điểm chuẩn ngành AI"));
        let conversation_id = reply.conversation_id.unwrap();

        let req = TestRequest::get()
            .uri("/api/conversations")
            .cookie(session.clone())
            .to_request();
        let conversations: Vec<ConversationSummary> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, conversation_id);
        assert_eq!(conversations[0].title, "Điểm chuẩn ngành AI");

        // Continuing the same conversation creates nothing new
        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session.clone())
            .set_json(json!({ "message": "Còn học phí?", "conversation_id": conversation_id }))
            .to_request();
        let reply: ChatResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.conversation_id, Some(conversation_id));

        let req = TestRequest::get()
            .uri(&format!("/api/conversation/{}", conversation_id))
            .cookie(session)
            .to_request();
        let messages: Vec<MessageView> = test::call_and_read_body_json(&app, req).await;
        let transcript: Vec<(String, String)> = messages
            .iter()
            .map(|m| (serde_json::to_value(m.role).unwrap().as_str().unwrap().to_string(), m.content.clone()))
            .collect();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0], ("user".to_string(), "Điểm chuẩn ngành AI".to_string()));
        assert_eq!(transcript[1].0, "assistant");
        assert!(transcript[1].1.contains("<strong>echo:</strong>"));
        assert_eq!(transcript[2], ("user".to_string(), "Còn học phí?".to_string()));

        // The second request carried the first turn as history
        let last = model.last_request();
        assert_eq!(last.len(), 5);
        assert_eq!(last[2], ("user".to_string(), "Điểm chuẩn ngành AI".to_string()));
    }

    #[actix_web::test]
    async fn first_answer_retitles_an_untitled_conversation() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let session = login!(app, "giang");

        let req = TestRequest::post()
            .uri("/api/conversation/new")
            .cookie(session.clone())
            .to_request();
        let created: NewConversationResponse = test::call_and_read_body_json(&app, req).await;
        assert!(created.success);

        let question = "Cho em hỏi về phương thức xét tuyển bằng điểm thi đánh giá năng lực năm nay";
        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session.clone())
            .set_json(json!({ "message": question, "conversation_id": created.id }))
            .to_request();
        let reply: ChatResponse = test::call_and_read_body_json(&app, req).await;

        let title = reply.new_title.unwrap();
        assert!(title.ends_with("..."));
        assert_eq!(title.trim_end_matches("...").chars().count(), 50);

        let stored = Conversation::get(&app_state.pool, created.id).await.unwrap().unwrap();
        assert_eq!(stored.title, title);

        // Already titled, so later turns leave it alone
        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session)
            .set_json(json!({ "message": "Cảm ơn", "conversation_id": created.id }))
            .to_request();
        let reply: ChatResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply.new_title.as_deref(), Some(title.as_str()));
    }

    #[actix_web::test]
    async fn blank_question_gets_a_soft_reply() {
        let (app_config, app_state, model) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let session = login!(app, "hai");

        for body in [json!({ "message": "   " }), json!({})] {
            let req = TestRequest::post()
                .uri("/api/chat")
                .cookie(session.clone())
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let value = json_body(resp).await;
            assert_eq!(value, json!({ "response": Prompts::EMPTY_QUESTION }));
        }

        let user = User::get_by_username(&app_state.pool, "hai").await.unwrap().unwrap();
        assert!(Conversation::list_for_user(&app_state.pool, user.id).await.unwrap().is_empty());
        assert_eq!(model.request_count(), 0);
    }

    #[actix_web::test]
    async fn model_failure_returns_apology_and_stores_nothing() {
        let (app_config, app_state, model) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let session = login!(app, "khanh");
        model.set_failing(true);

        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session)
            .set_json(json!({ "message": "Học phí ngành CNTT?" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let reply: ChatResponse = test::read_body_json(resp).await;

        assert_eq!(reply.response, Prompts::APOLOGY);
        assert_eq!(reply.new_title.as_deref(), Some("Học phí ngành CNTT?"));
        let conversation_id = reply.conversation_id.unwrap();
        assert_eq!(
            Message::count_for_conversation(&app_state.pool, conversation_id).await.unwrap(),
            0
        );
    }

    #[actix_web::test]
    async fn foreign_conversations_are_forbidden() {
        let (app_config, app_state, model) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let owner = login!(app, "lan");
        let intruder = login!(app, "minh");

        let req = TestRequest::post()
            .uri("/api/conversation/new")
            .cookie(owner)
            .to_request();
        let created: NewConversationResponse = test::call_and_read_body_json(&app, req).await;
        let id = created.id;

        let requests = vec![
            TestRequest::get().uri(&format!("/api/conversation/{}", id)),
            TestRequest::put()
                .uri(&format!("/api/conversation/rename/{}", id))
                .set_json(json!({ "title": "mine now" })),
            TestRequest::delete().uri(&format!("/api/conversation/delete/{}", id)),
            TestRequest::post()
                .uri("/api/chat")
                .set_json(json!({ "message": "xin chào", "conversation_id": id })),
        ];
        for req in requests {
            let resp = test::call_service(&app, req.cookie(intruder.clone()).to_request()).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            let body: StatusResponse = test::read_body_json(resp).await;
            assert!(!body.success);
        }

        let stored = Conversation::get(&app_state.pool, id).await.unwrap().unwrap();
        assert_eq!(stored.title, crate::models::conversation::DEFAULT_TITLE);
        assert_eq!(model.request_count(), 0);
    }

    #[actix_web::test]
    async fn unknown_conversations_are_not_found() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;
        let session = login!(app, "nam");
        let missing = Uuid::new_v4();

        let req = TestRequest::get()
            .uri(&format!("/api/conversation/{}", missing))
            .cookie(session.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session)
            .set_json(json!({ "message": "xin chào", "conversation_id": missing }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn rename_trims_and_rejects_blank_titles() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;
        let session = login!(app, "oanh");

        let req = TestRequest::post()
            .uri("/api/conversation/new")
            .cookie(session.clone())
            .to_request();
        let created: NewConversationResponse = test::call_and_read_body_json(&app, req).await;
        let uri = format!("/api/conversation/rename/{}", created.id);

        let req = TestRequest::put()
            .uri(&uri)
            .cookie(session.clone())
            .set_json(json!({ "title": "   " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = TestRequest::put()
            .uri(&uri)
            .cookie(session.clone())
            .set_json(json!({ "title": "  Học bổng  " }))
            .to_request();
        let body: StatusResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);

        let req = TestRequest::get()
            .uri("/api/conversations")
            .cookie(session)
            .to_request();
        let conversations: Vec<ConversationSummary> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(conversations[0].title, "Học bổng");
    }

    #[actix_web::test]
    async fn delete_removes_conversation_and_messages() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state.clone())).await;
        let session = login!(app, "phuong");

        let req = TestRequest::post()
            .uri("/api/chat")
            .cookie(session.clone())
            .set_json(json!({ "message": "Ký túc xá?" }))
            .to_request();
        let reply: ChatResponse = test::call_and_read_body_json(&app, req).await;
        let id = reply.conversation_id.unwrap();
        assert_eq!(Message::count_for_conversation(&app_state.pool, id).await.unwrap(), 2);

        let req = TestRequest::delete()
            .uri(&format!("/api/conversation/delete/{}", id))
            .cookie(session.clone())
            .to_request();
        let body: StatusResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);

        assert!(Conversation::get(&app_state.pool, id).await.unwrap().is_none());
        assert_eq!(Message::count_for_conversation(&app_state.pool, id).await.unwrap(), 0);

        let req = TestRequest::get()
            .uri(&format!("/api/conversation/{}", id))
            .cookie(session)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn malformed_bodies_and_ids_get_json_errors() {
        let (app_config, app_state, _) = test_state().await;
        let app = test::init_service(create_app(app_config, app_state)).await;

        let req = TestRequest::post()
            .uri("/api/register")
            .set_json(json!({ "username": "a" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("password"));

        let session = login!(app, "quang");
        let req = TestRequest::get()
            .uri("/api/conversation/not-a-uuid")
            .cookie(session)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(resp).await,
            json!({ "success": false, "message": "Conversation not found" })
        );
    }

    #[actix_web::test]
    async fn turn_for_a_conversation_deleted_mid_answer_is_not_found() {
        let (_, app_state, _) = test_state().await;
        let pool = &app_state.pool;
        let user = User::create(pool, "son", "secret").await.unwrap();
        let conversation = Conversation::create(pool, user.id, "Học bổng").await.unwrap();
        Conversation::delete(pool, conversation.id).await.unwrap();

        let reply = Reply {
            content: "<p>answer</p>\n".to_string(),
            markdown: "answer".to_string(),
            answered: true,
        };
        let result = super::chat::store_turn(pool, conversation.id, "Học bổng?", &reply).await;

        assert!(matches!(result, Err(ApiError::NotFound("Conversation"))));
        assert_eq!(Message::count_for_conversation(pool, conversation.id).await.unwrap(), 0);
    }
}
