mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{owner_token, send_json, spawn_app, token_for, TestApp, TestAppOptions};
use pestguard_api::auth::UserRole;

async fn create_company(app: &TestApp, cnpj: &str) -> Uuid {
    let token = owner_token();
    let (status, company) = send_json(
        app,
        "POST",
        "/api/v1/companies",
        Some(&token),
        Some(json!({"name": "Dedetizadora Alfa", "cnpj": cnpj})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    company["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = spawn_app(TestAppOptions::default()).await;
    let (status, _) = send_json(&app, "GET", "/api/v1/companies", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_owner_accounts_create_companies() {
    let app = spawn_app(TestAppOptions::default()).await;

    let admin = token_for(UserRole::Admin, "admin@other.test", Some(Uuid::new_v4()));
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/v1/companies",
        Some(&admin),
        Some(json!({"name": "Beta", "cnpj": "99.999.999/0001-99"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    create_company(&app, "12.345.678/0001-00").await;
}

#[tokio::test]
async fn duplicate_cnpj_answers_conflict() {
    let app = spawn_app(TestAppOptions::default()).await;
    create_company(&app, "11.111.111/0001-11").await;

    let token = owner_token();
    let (status, _) = send_json(
        &app,
        "POST",
        "/api/v1/companies",
        Some(&token),
        Some(json!({"name": "Beta", "cnpj": "11.111.111/0001-11"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn company_reads_are_scoped_to_members() {
    let app = spawn_app(TestAppOptions::default()).await;
    let company_id = create_company(&app, "22.222.222/0001-22").await;

    let member = token_for(UserRole::Controlador, "tech@alfa.test", Some(company_id));
    let (status, company) = send_json(
        &app,
        "GET",
        &format!("/api/v1/companies/{}", company_id),
        Some(&member),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(company["name"], json!("Dedetizadora Alfa"));

    let outsider = token_for(UserRole::Admin, "admin@other.test", Some(Uuid::new_v4()));
    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/v1/companies/{}", company_id),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn updates_require_admin_of_the_company() {
    let app = spawn_app(TestAppOptions::default()).await;
    let company_id = create_company(&app, "33.333.333/0001-33").await;

    let controller = token_for(UserRole::Controlador, "tech@alfa.test", Some(company_id));
    let (status, _) = send_json(
        &app,
        "PUT",
        &format!("/api/v1/companies/{}", company_id),
        Some(&controller),
        Some(json!({"phone": "(11) 99999-0000"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for(UserRole::Admin, "admin@alfa.test", Some(company_id));
    let (status, updated) = send_json(
        &app,
        "PUT",
        &format!("/api/v1/companies/{}", company_id),
        Some(&admin),
        Some(json!({"phone": "(11) 99999-0000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["phone"], json!("(11) 99999-0000"));
    assert_eq!(updated["name"], json!("Dedetizadora Alfa"));
}

#[tokio::test]
async fn owner_lists_all_companies() {
    let app = spawn_app(TestAppOptions::default()).await;
    create_company(&app, "44.444.444/0001-44").await;
    create_company(&app, "55.555.555/0001-55").await;

    let token = owner_token();
    let (status, companies) = send_json(&app, "GET", "/api/v1/companies", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(companies.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deletion_is_owner_only_and_removes_the_company() {
    let app = spawn_app(TestAppOptions::default()).await;
    let company_id = create_company(&app, "66.666.666/0001-66").await;

    let admin = token_for(UserRole::Admin, "admin@alfa.test", Some(company_id));
    let (status, _) = send_json(
        &app,
        "DELETE",
        &format!("/api/v1/companies/{}", company_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = owner_token();
    let (status, _) = send_json(
        &app,
        "DELETE",
        &format!("/api/v1/companies/{}", company_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send_json(
        &app,
        "GET",
        &format!("/api/v1/companies/{}", company_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_components_up() {
    let app = spawn_app(TestAppOptions::default()).await;
    let (status, body) = send_json(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["database"], json!("up"));
    assert_eq!(body["billing_store"], json!("up"));
}
