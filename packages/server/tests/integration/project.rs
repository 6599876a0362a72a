use serde_json::{Value, json};

use crate::common::{TestApp, routes};

fn versions_canvas() -> Value {
    json!({
        "nodes": [],
        "edges": [],
        "viewport": {"x": 0, "y": 0, "zoom": 1.25},
        "versions": [
            {
                "id": "root",
                "parentId": null,
                "imageUrl": "https://cdn.test/generations/a-0.png",
                "config": {},
                "name": "Version 1",
                "type": "generate",
                "createdAt": "2026-01-01T00:00:00Z"
            },
            {
                "id": "child",
                "parentId": "root",
                "imageUrl": "https://cdn.test/generations/b-0.png",
                "config": {},
                "name": "Version 2",
                "type": "refine",
                "createdAt": "2026-01-01T00:01:00Z"
            },
            {
                "id": "orphan",
                "parentId": "deleted",
                "imageUrl": "https://cdn.test/generations/c-0.png",
                "config": {},
                "name": "Version 3",
                "type": "refine",
                "createdAt": "2026-01-01T00:02:00Z"
            }
        ]
    })
}

mod crud {
    use super::*;

    #[tokio::test]
    async fn owner_can_create_and_fetch_a_project() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app
            .post_with_token(
                routes::PROJECTS,
                &json!({"name": "  Lake house  ", "style": "scandinavian"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["name"], "Lake house");
        assert_eq!(res.body["canvas_state"], json!({}));
        let id = res.id();

        let res = app.get_with_token(&routes::project(id), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["style"], "scandinavian");
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app
            .post_with_token(routes::PROJECTS, &json!({"name": "   "}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn canvas_state_round_trips_unknown_fields() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft"}))
            .await;

        let canvas = versions_canvas();
        let res = app
            .patch_with_token(&routes::project(id), &json!({"canvas_state": canvas}), &token)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app.get_with_token(&routes::project(id), &token).await;
        assert_eq!(res.body["canvas_state"], canvas);
    }

    #[tokio::test]
    async fn canvas_state_must_be_an_object() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft"}))
            .await;

        let res = app
            .patch_with_token(&routes::project(id), &json!({"canvas_state": [1, 2]}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn null_clears_base_image() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(
                &token,
                &json!({"name": "Loft", "base_image_url": "https://cdn.test/uploads/x.png"}),
            )
            .await;

        let res = app
            .patch_with_token(&routes::project(id), &json!({"base_image_url": null}), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["base_image_url"].is_null());
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_caller_and_searchable() {
        let app = TestApp::spawn().await;
        let alice = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let bob = app
            .create_authenticated_user("bob@example.com", "securepass")
            .await;

        app.create_project(&alice, &json!({"name": "Lake house"})).await;
        app.create_project(&alice, &json!({"name": "City loft"})).await;
        app.create_project(&bob, &json!({"name": "Bob's barn"})).await;

        let res = app.get_with_token(routes::PROJECTS, &alice).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert!(res.body["data"][0].get("canvas_state").is_none());

        let res = app
            .get_with_token(&format!("{}?search=LAKE", routes::PROJECTS), &alice)
            .await;
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["name"], "Lake house");

        let res = app
            .get_with_token(
                &format!("{}?sort_by=name&sort_order=asc", routes::PROJECTS),
                &alice,
            )
            .await;
        assert_eq!(res.body["data"][0]["name"], "City loft");
    }

    #[tokio::test]
    async fn unknown_sort_field_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;

        let res = app
            .get_with_token(&format!("{}?sort_by=owner", routes::PROJECTS), &token)
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn delete_removes_the_project() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft"}))
            .await;

        let res = app.delete_with_token(&routes::project(id), &token).await;
        assert_eq!(res.status, 204);

        let res = app.get_with_token(&routes::project(id), &token).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn other_users_cannot_read_or_change_a_project() {
        let app = TestApp::spawn().await;
        let alice = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let bob = app
            .create_authenticated_user("bob@example.com", "securepass")
            .await;
        let id = app
            .create_project(&alice, &json!({"name": "Private"}))
            .await;

        let res = app.get_with_token(&routes::project(id), &bob).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        let res = app
            .patch_with_token(&routes::project(id), &json!({"name": "Mine"}), &bob)
            .await;
        assert_eq!(res.status, 403);

        let res = app.delete_with_token(&routes::project(id), &bob).await;
        assert_eq!(res.status, 403);

        let res = app.get_with_token(&routes::project(id), &alice).await;
        assert_eq!(res.body["name"], "Private");
    }

    #[tokio::test]
    async fn projects_require_authentication() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::PROJECTS).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }
}

mod settings {
    use super::*;

    #[tokio::test]
    async fn settings_patch_updates_and_clears() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(
                &token,
                &json!({"name": "Loft", "style": "industrial", "camera": "wide"}),
            )
            .await;

        let res = app
            .patch_with_token(
                &routes::project_settings(id),
                &json!({"lighting": "golden hour", "camera": null}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app.get_with_token(&routes::project_settings(id), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["style"], "industrial");
        assert_eq!(res.body["lighting"], "golden hour");
        assert!(res.body["camera"].is_null());
    }
}

mod versions {
    use super::*;

    #[tokio::test]
    async fn path_walks_parents_to_the_root() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft", "canvas_state": versions_canvas()}))
            .await;

        let res = app
            .get_with_token(&routes::version_path(id, "child"), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["path"], json!(["root", "child"]));
        assert_eq!(res.body["versions"][1]["name"], "Version 2");
    }

    #[tokio::test]
    async fn missing_parent_ends_the_walk() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft", "canvas_state": versions_canvas()}))
            .await;

        let res = app
            .get_with_token(&routes::version_path(id, "orphan"), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["path"], json!(["orphan"]));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app
            .create_authenticated_user("alice@example.com", "securepass")
            .await;
        let id = app
            .create_project(&token, &json!({"name": "Loft", "canvas_state": versions_canvas()}))
            .await;

        let res = app
            .get_with_token(&routes::version_path(id, "nope"), &token)
            .await;

        assert_eq!(res.status, 404);
    }
}
