//! Routes:
//! - `POST   /partnere`
//! - `GET    /partnere?navn=`
//! - `GET    /partnere/:id`
//! - `PATCH  /partnere/:id`
//! - `DELETE /partnere/:id`

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Router,
};
use serde::Deserialize;

use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::partner::Partner;
use crate::services::partner::{NyPartner, PartnerEndring};

#[derive(Debug, Default, Deserialize)]
pub struct NavnQuery {
    pub navn: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/partnere", get(list_partnere).post(create_partner))
        .route(
            "/partnere/:id",
            get(get_partner).patch(update_partner).delete(delete_partner),
        )
}

async fn create_partner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyPartner>,
) -> Result<(StatusCode, Json<Partner>), AppError> {
    let created = state.partnere.create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_partnere(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<NavnQuery>,
) -> Result<Json<Vec<Partner>>, AppError> {
    Ok(Json(
        state.partnere.list(&identity, query.navn.as_deref()).await?,
    ))
}

async fn get_partner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Partner>, AppError> {
    Ok(Json(state.partnere.get(&identity, id).await?))
}

async fn update_partner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<PartnerEndring>,
) -> Result<Json<Partner>, AppError> {
    Ok(Json(state.partnere.update(&identity, id, body).await?))
}

async fn delete_partner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.partnere.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    use crate::api::testing::TestApp;

    #[tokio::test]
    async fn post_creates_partner_and_group() {
        let app = TestApp::new(routes()).await;
        let (status, json) = app
            .call(
                &Identity::admin(),
                Method::POST,
                "/partnere",
                Some(json!({"navn": "Fretex", "ideell": true, "storrelse": "STOR"})),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["navn"], "Fretex");
        assert_eq!(json["storrelse"], "STOR");
        assert_eq!(app.groups.calls().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_returns_409() {
        let app = TestApp::new(routes()).await;
        let body = json!({"navn": "Fretex"});
        app.call(&Identity::admin(), Method::POST, "/partnere", Some(body.clone()))
            .await;
        let (status, json) = app
            .call(&Identity::admin(), Method::POST, "/partnere", Some(body))
            .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn partner_cannot_create() {
        let app = TestApp::new(routes()).await;
        let (status, _) = app
            .call(
                &Identity::partner(1),
                Method::POST,
                "/partnere",
                Some(json!({"navn": "Fretex"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_filters_by_name() {
        let app = TestApp::new(routes()).await;
        for navn in ["Fretex", "Kirkens Bymisjon"] {
            app.call(
                &Identity::admin(),
                Method::POST,
                "/partnere",
                Some(json!({ "navn": navn })),
            )
            .await;
        }

        let (status, json) = app
            .call(&Identity::stasjon(1), Method::GET, "/partnere?navn=bymis", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["navn"], "Kirkens Bymisjon");
    }

    #[tokio::test]
    async fn patch_then_delete() {
        let app = TestApp::new(routes()).await;
        let (_, created) = app
            .call(
                &Identity::admin(),
                Method::POST,
                "/partnere",
                Some(json!({"navn": "Fretex"})),
            )
            .await;
        let uri = format!("/partnere/{}", created["id"]);

        let (status, json) = app
            .call(
                &Identity::admin(),
                Method::PATCH,
                &uri,
                Some(json!({"navn": "Fretex Øst", "storrelse": "MIDDELS"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["navn"], "Fretex Øst");

        let (status, json) = app.call(&Identity::admin(), Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(json.is_null());

        let (status, _) = app.call(&Identity::admin(), Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_storrelse_is_rejected() {
        let app = TestApp::new(routes()).await;
        let (status, json) = app
            .call(
                &Identity::admin(),
                Method::POST,
                "/partnere",
                Some(json!({"navn": "Fretex", "storrelse": "ENORM"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap().contains("storrelse"));
    }
}
