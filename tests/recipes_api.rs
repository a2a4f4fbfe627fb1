mod common;

use axum::http::StatusCode;
use common::{png_bytes, TestApp};
use recipe_service::models::{Ingredient, Tag};
use serde_json::{json, Value};

const RECIPES_URL: &str = "/api/recipe/recipes";

fn detail_url(id: u64) -> String {
    format!("{RECIPES_URL}/{id}")
}

fn image_upload_url(id: u64) -> String {
    format!("{RECIPES_URL}/{id}/upload-image")
}

async fn create_recipe(app: &TestApp, token: &str, extra: Value) -> Value {
    let mut payload = json!({
        "title": "Sample recipe title",
        "time_minutes": 22,
        "price": "5.25",
        "link": "http://example.com/recipe.pdf",
    });
    if let (Some(base), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    let res = app.post(RECIPES_URL, Some(token), payload).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    res.body
}

fn id_of(body: &Value) -> u64 {
    body["id"].as_u64().unwrap()
}

#[tokio::test]
async fn test_auth_required() {
    let app = TestApp::new();

    let res = app.get(RECIPES_URL, None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_retrieve_recipes() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let first = create_recipe(&app, &token, json!({ "title": "First" })).await;
    let second = create_recipe(&app, &token, json!({ "title": "Second" })).await;

    let res = app.get(RECIPES_URL, Some(&token)).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!([second.clone(), first]));
    assert_eq!(
        res.body[0],
        json!({
            "id": id_of(&second),
            "title": "Second",
            "time_minutes": 22,
            "price": "5.25",
            "link": "http://example.com/recipe.pdf",
        })
    );
}

#[tokio::test]
async fn test_recipe_list_limited_to_user() {
    let app = TestApp::new();
    let (_, other_token) = app.login("other@example.com").await;
    create_recipe(&app, &other_token, json!({})).await;
    let (_, token) = app.login("user@example.com").await;
    let mine = create_recipe(&app, &token, json!({})).await;

    let res = app.get(RECIPES_URL, Some(&token)).await;

    assert_eq!(res.body, json!([mine]));
}

#[tokio::test]
async fn test_get_recipe_detail() {
    let app = TestApp::new();
    let (user, token) = app.login("user@example.com").await;
    let tag = app.state.recipes.create_attr::<Tag>(user.id, "Dinner").await.unwrap();
    let ingredient = app
        .state
        .recipes
        .create_attr::<Ingredient>(user.id, "Rice")
        .await
        .unwrap();
    let recipe = create_recipe(
        &app,
        &token,
        json!({ "tags": [tag.id], "ingredients": [ingredient.id] }),
    )
    .await;

    let res = app.get(&detail_url(id_of(&recipe)), Some(&token)).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["title"], "Sample recipe title");
    assert_eq!(res.body["tags"], json!([{ "id": tag.id, "name": "Dinner" }]));
    assert_eq!(
        res.body["ingredients"],
        json!([{ "id": ingredient.id, "name": "Rice" }])
    );
    assert_eq!(res.body["image"], Value::Null);
}

#[tokio::test]
async fn test_other_users_recipe_not_found() {
    let app = TestApp::new();
    let (_, owner_token) = app.login("owner@example.com").await;
    let recipe = create_recipe(&app, &owner_token, json!({})).await;
    let (_, token) = app.login("user@example.com").await;
    let url = detail_url(id_of(&recipe));

    assert_eq!(app.get(&url, Some(&token)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.patch(&url, Some(&token), json!({ "title": "Mine now" })).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.delete(&url, Some(&token)).await.status, StatusCode::NOT_FOUND);

    let still_there = app.get(&url, Some(&owner_token)).await;
    assert_eq!(still_there.body["title"], "Sample recipe title");
}

#[tokio::test]
async fn test_non_numeric_id_not_found() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;

    let res = app.get(&format!("{RECIPES_URL}/abc"), Some(&token)).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_recipe_missing_fields() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;

    let res = app.post(RECIPES_URL, Some(&token), json!({ "title": "No price" })).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("time_minutes").is_some());
    assert!(res.body.get("price").is_some());
    assert_eq!(app.get(RECIPES_URL, Some(&token)).await.body, json!([]));
}

#[tokio::test]
async fn test_create_recipe_rejects_bad_price() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let payload = json!({ "title": "Pricey", "time_minutes": 5, "price": "1000.00" });

    let res = app.post(RECIPES_URL, Some(&token), payload).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("price").is_some());
}

#[tokio::test]
async fn test_create_recipe_time_must_be_integer() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let payload = json!({ "title": "Soup", "time_minutes": "ten", "price": "2.00" });

    let res = app.post(RECIPES_URL, Some(&token), payload).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, json!({ "time_minutes": ["A valid integer is required."] }));
    assert_eq!(app.get(RECIPES_URL, Some(&token)).await.body, json!([]));
}

#[tokio::test]
async fn test_create_recipe_accepts_numeric_strings() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let payload = json!({ "title": "Soup", "time_minutes": "5", "price": 2.5 });

    let res = app.post(RECIPES_URL, Some(&token), payload).await;

    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.body["time_minutes"], json!(5));
    assert_eq!(res.body["price"], json!("2.50"));
}

#[tokio::test]
async fn test_create_recipe_price_must_be_number() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let payload = json!({ "title": "Soup", "time_minutes": 5, "price": "abc" });

    let res = app.post(RECIPES_URL, Some(&token), payload).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, json!({ "price": ["A valid number is required."] }));
}

#[tokio::test]
async fn test_partial_update_reports_type_error_per_field() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let id = id_of(&create_recipe(&app, &token, json!({})).await);

    let res = app
        .patch(&detail_url(id), Some(&token), json!({ "time_minutes": [1] }))
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, json!({ "time_minutes": ["A valid integer is required."] }));
    let detail = app.get(&detail_url(id), Some(&token)).await.body;
    assert_eq!(detail["time_minutes"], json!(22));
}

#[tokio::test]
async fn test_create_recipe_with_foreign_tag() {
    let app = TestApp::new();
    let other = app.create_user("other@example.com").await;
    let foreign = app.state.recipes.create_attr::<Tag>(other.id, "Theirs").await.unwrap();
    let (_, token) = app.login("user@example.com").await;
    let payload = json!({ "title": "T", "time_minutes": 5, "price": "1.00", "tags": [foreign.id] });

    let res = app.post(RECIPES_URL, Some(&token), payload).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("tags").is_some());
}

#[tokio::test]
async fn test_partial_update() {
    let app = TestApp::new();
    let (user, token) = app.login("user@example.com").await;
    let tag = app.state.recipes.create_attr::<Tag>(user.id, "Curry").await.unwrap();
    let recipe = create_recipe(&app, &token, json!({ "tags": [tag.id] })).await;
    let url = detail_url(id_of(&recipe));

    let res = app.patch(&url, Some(&token), json!({ "title": "New recipe title" })).await;
    assert_eq!(res.status, StatusCode::OK);

    let detail = app.get(&url, Some(&token)).await.body;
    assert_eq!(detail["title"], "New recipe title");
    assert_eq!(detail["link"], "http://example.com/recipe.pdf");
    assert_eq!(detail["price"], "5.25");
    assert_eq!(detail["tags"], json!([{ "id": tag.id, "name": "Curry" }]));
}

#[tokio::test]
async fn test_full_update() {
    let app = TestApp::new();
    let (user, token) = app.login("user@example.com").await;
    let tag = app.state.recipes.create_attr::<Tag>(user.id, "Curry").await.unwrap();
    let recipe = create_recipe(&app, &token, json!({ "tags": [tag.id] })).await;
    let url = detail_url(id_of(&recipe));

    let payload = json!({ "title": "Spaghetti carbonara", "time_minutes": 25, "price": "5.00" });
    let res = app.put(&url, Some(&token), payload).await;
    assert_eq!(res.status, StatusCode::OK);

    let detail = app.get(&url, Some(&token)).await.body;
    assert_eq!(detail["title"], "Spaghetti carbonara");
    assert_eq!(detail["time_minutes"], 25);
    assert_eq!(detail["price"], "5.00");
    assert_eq!(detail["link"], "");
    assert_eq!(detail["tags"], json!([]));
}

#[tokio::test]
async fn test_delete_recipe() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let recipe = create_recipe(&app, &token, json!({})).await;
    let url = detail_url(id_of(&recipe));

    let res = app.delete(&url, Some(&token)).await;

    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&url, Some(&token)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_filter_recipes_by_tags() {
    let app = TestApp::new();
    let (user, token) = app.login("user@example.com").await;
    let vegan = app.state.recipes.create_attr::<Tag>(user.id, "Vegan").await.unwrap();
    let veggie = app.state.recipes.create_attr::<Tag>(user.id, "Vegetarian").await.unwrap();
    let curry = create_recipe(&app, &token, json!({ "title": "Thai curry", "tags": [vegan.id] })).await;
    let tahini = create_recipe(&app, &token, json!({ "title": "Aubergine", "tags": [veggie.id] })).await;
    let fish = create_recipe(&app, &token, json!({ "title": "Fish and chips" })).await;

    let res = app
        .get(&format!("{RECIPES_URL}?tags={},{}", vegan.id, veggie.id), Some(&token))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    let listed = res.body.as_array().unwrap();
    assert!(listed.contains(&curry));
    assert!(listed.contains(&tahini));
    assert!(!listed.contains(&fish));
}

#[tokio::test]
async fn test_filter_recipes_by_ingredients() {
    let app = TestApp::new();
    let (user, token) = app.login("user@example.com").await;
    let feta = app
        .state
        .recipes
        .create_attr::<Ingredient>(user.id, "Feta")
        .await
        .unwrap();
    let salad = create_recipe(&app, &token, json!({ "title": "Greek salad", "ingredients": [feta.id] })).await;
    create_recipe(&app, &token, json!({ "title": "Toast" })).await;

    let res = app
        .get(&format!("{RECIPES_URL}?ingredients={}", feta.id), Some(&token))
        .await;

    assert_eq!(res.body, json!([salad]));
}

#[tokio::test]
async fn test_filter_rejects_bad_ids() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;

    let res = app.get(&format!("{RECIPES_URL}?tags=one,2"), Some(&token)).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_image_to_recipe() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let recipe = create_recipe(&app, &token, json!({})).await;
    let id = id_of(&recipe);

    let res = app
        .upload(&image_upload_url(id), &token, "image", "myimage.jpg", &png_bytes())
        .await;

    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let url = res.body["image"].as_str().unwrap().to_string();
    assert!(url.starts_with("/media/uploads/recipe/"));
    assert!(url.ends_with(".jpg"));

    let relative = url.trim_start_matches("/media/");
    assert!(app.dir.path().join("media").join(relative).exists());

    let detail = app.get(&detail_url(id), Some(&token)).await.body;
    assert_eq!(detail["image"], json!(url));
}

#[tokio::test]
async fn test_upload_image_replaces_previous_file() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let id = id_of(&create_recipe(&app, &token, json!({})).await);
    let media = app.dir.path().join("media");

    let first = app
        .upload(&image_upload_url(id), &token, "image", "first.png", &png_bytes())
        .await;
    let first_path = media.join(first.body["image"].as_str().unwrap().trim_start_matches("/media/"));
    assert!(first_path.exists());

    let second = app
        .upload(&image_upload_url(id), &token, "image", "second.png", &png_bytes())
        .await;

    assert_eq!(second.status, StatusCode::OK);
    assert!(!first_path.exists());
}

#[tokio::test]
async fn test_upload_image_bad_request() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let id = id_of(&create_recipe(&app, &token, json!({})).await);

    let res = app
        .upload(&image_upload_url(id), &token, "image", "notimage.txt", b"notimage")
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("image").is_some());
    let detail = app.get(&detail_url(id), Some(&token)).await.body;
    assert_eq!(detail["image"], Value::Null);
}

#[tokio::test]
async fn test_upload_image_with_html_name_refused() {
    let app = TestApp::new();
    let (_, token) = app.login("user@example.com").await;
    let id = id_of(&create_recipe(&app, &token, json!({})).await);

    let res = app
        .upload(&image_upload_url(id), &token, "image", "x.html", &png_bytes())
        .await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body.get("image").is_some());
    let detail = app.get(&detail_url(id), Some(&token)).await.body;
    assert_eq!(detail["image"], Value::Null);
}

#[tokio::test]
async fn test_upload_image_to_foreign_recipe() {
    let app = TestApp::new();
    let (_, owner_token) = app.login("owner@example.com").await;
    let id = id_of(&create_recipe(&app, &owner_token, json!({})).await);
    let (_, token) = app.login("user@example.com").await;

    let res = app
        .upload(&image_upload_url(id), &token, "image", "myimage.png", &png_bytes())
        .await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
}
