// tests/api_store.rs
//
// GET /api/store: sheet row → landing page profile.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, app_with_sheet, config, get, send};
use review_generator::llm::ScriptedGenerator;
use review_generator::sheet::StaticSheetSource;

#[tokio::test]
async fn store_profile_is_normalized() {
    let t = app();
    let mut req = get("/api/store?storeid=WANG01");
    req.headers_mut()
        .insert("x-forwarded-host", "reviews.example".parse().unwrap());

    let r = send(&t.router, req).await;
    assert_eq!(r.status, StatusCode::OK, "{}", r.text);
    assert_eq!(r.headers["cache-control"], "public, max-age=60");

    let p = &r.body;
    assert_eq!(p["storeid"], "wang01");
    assert_eq!(p["name"], "老王牛肉麵");
    assert_eq!(p["placeId"], "ChIJ123");
    assert_eq!(
        p["logoUrl"],
        "https://drive.google.com/uc?export=view&id=LOGO1"
    );
    assert_eq!(p["heroUrl"], "https://reviews.example/assets/hero.jpg");
    assert_eq!(p["placePhotoUrl"], "");
    assert_eq!(p["top3"], "牛肉麵,小菜");
    assert_eq!(p["top3En"], "beef noodles,side dishes");
    assert_eq!(p["consEn"], "slow service");
    assert_eq!(p["consJa"], "");
}

#[tokio::test]
async fn store_alias_param_is_accepted() {
    let t = app();
    let r = send(&t.router, get("/api/store?store=wang01")).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["storeid"], "wang01");
}

#[tokio::test]
async fn unknown_store_is_not_found() {
    let t = app();
    let r = send(&t.router, get("/api/store?storeid=nope")).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.body, json!({ "error": "StoreID not found: nope" }));
}

#[tokio::test]
async fn missing_store_param_is_bad_request() {
    let t = app();
    let r = send(&t.router, get("/api/store?storeid=%20")).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.body["error"], "Missing storeid");
}

#[tokio::test]
async fn unconfigured_sheet_is_server_error() {
    let t = app_with_sheet(
        config(),
        ScriptedGenerator::repeating("x"),
        Arc::new(StaticSheetSource::unconfigured()),
    );
    let r = send(&t.router, get("/api/store?storeid=wang01")).await;
    assert_eq!(r.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(r.body["error"], "Missing SHEET_CSV_URL or SHEET_ID");
}
