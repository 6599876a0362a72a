use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use server::entity::verification_token;

use crate::common::{TestApp, TestResponse, routes};

mod registration {
    use super::*;

    #[tokio::test]
    async fn new_user_can_register_with_valid_credentials() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({"email": "Alice@Example.com", "password": "securepass", "name": "Alice"}),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert!(res.body["id"].is_number());
        assert_eq!(res.body["email"], "alice@example.com");
        assert_eq!(res.body["name"], "Alice");
        assert!(res.body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn cannot_register_with_an_already_taken_email() {
        let app = TestApp::spawn().await;
        let body = json!({"email": "alice@example.com", "password": "securepass"});

        let first = app.post_without_token(routes::REGISTER, &body).await;
        assert_eq!(first.status, 201, "First registration failed: {}", first.text);

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({"email": "ALICE@example.com", "password": "otherpass1"}),
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn cannot_register_with_a_password_that_is_too_short() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({"email": "alice@example.com", "password": "short"}),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn cannot_register_with_an_invalid_email() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({"email": "not-an-email", "password": "securepass"}),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn request_without_json_content_type_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::REGISTER))
            .body("email=alice@example.com")
            .send()
            .await
            .unwrap();
        let res = TestResponse::from_response(res).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn registered_user_can_log_in_and_fetch_profile() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app.get_with_token(routes::ME, &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn login_sets_session_cookie() {
        let app = TestApp::spawn().await;
        let body = json!({"email": "alice@example.com", "password": "securepass"});
        app.post_without_token(routes::REGISTER, &body).await;

        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::LOGIN))
            .json(&body)
            .send()
            .await
            .unwrap();

        let cookie = res
            .headers()
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|c| c.starts_with("archflow_session="))
            .map(str::to_string);
        assert!(cookie.is_some(), "missing session cookie");
        assert!(cookie.unwrap().contains("HttpOnly"));

        let res = TestResponse::from_response(res).await;
        assert_eq!(res.status, 200);
        assert!(res.body["token"].is_string());
        assert!(res.body["expires_at"].is_string());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "alice@example.com", "password": "wrongpass"}),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn unknown_email_is_rejected_like_a_wrong_password() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "nobody@example.com", "password": "securepass"}),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }
}

mod sessions {
    use super::*;

    #[tokio::test]
    async fn me_requires_a_token() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get_with_token(routes::ME, "not-a-jwt").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app.post_with_token(routes::LOGOUT, &json!({}), &token).await;
        assert_eq!(res.status, 204, "{}", res.text);

        let res = app.get_with_token(routes::ME, &token).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }
}

mod magic_link {
    use super::*;

    async fn issued_token(app: &TestApp, email: &str) -> String {
        let res = app
            .post_without_token(routes::MAGIC_LINK, &json!({"email": email}))
            .await;
        assert_eq!(res.status, 202, "{}", res.text);

        verification_token::Entity::find()
            .filter(verification_token::Column::Identifier.eq(email))
            .one(&app.db)
            .await
            .expect("DB query failed")
            .expect("Token not stored")
            .token
    }

    #[tokio::test]
    async fn first_sign_in_creates_a_verified_user() {
        let app = TestApp::spawn().await;
        let token = issued_token(&app, "bob@example.com").await;

        let res = app
            .post_without_token(
                routes::MAGIC_LINK_VERIFY,
                &json!({"email": "bob@example.com", "token": token}),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["user"]["email"], "bob@example.com");
        assert!(res.body["user"]["email_verified"].is_string());

        let session = res.body["token"].as_str().unwrap();
        let me = app.get_with_token(routes::ME, session).await;
        assert_eq!(me.status, 200);
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let app = TestApp::spawn().await;
        let token = issued_token(&app, "bob@example.com").await;
        let body = json!({"email": "bob@example.com", "token": token});

        let first = app.post_without_token(routes::MAGIC_LINK_VERIFY, &body).await;
        assert_eq!(first.status, 200, "{}", first.text);

        let second = app.post_without_token(routes::MAGIC_LINK_VERIFY, &body).await;
        assert_eq!(second.status, 401);
        assert_eq!(second.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn token_is_bound_to_its_email() {
        let app = TestApp::spawn().await;
        let token = issued_token(&app, "bob@example.com").await;

        let res = app
            .post_without_token(
                routes::MAGIC_LINK_VERIFY,
                &json!({"email": "mallory@example.com", "token": token}),
            )
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn existing_password_user_can_sign_in_by_link() {
        let app = TestApp::spawn().await;
        app.create_authenticated_user("alice@example.com", "securepass")
            .await;
        let token = issued_token(&app, "alice@example.com").await;

        let res = app
            .post_without_token(
                routes::MAGIC_LINK_VERIFY,
                &json!({"email": "alice@example.com", "token": token}),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["user"]["email_verified"].is_string());

        // Password login still works afterwards.
        let login = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "alice@example.com", "password": "securepass"}),
            )
            .await;
        assert_eq!(login.status, 200);
    }
}
