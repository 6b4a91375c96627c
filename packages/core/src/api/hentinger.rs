//! Henteplaner, their generated planlagte hentinger, and ekstra hentinger.
//!
//! Routes:
//! - `POST   /henteplaner`, `GET /henteplaner?partner_id=&stasjon_id=`
//! - `GET    /henteplaner/:id`, `PATCH /henteplaner/:id`, `DELETE /henteplaner/:id`
//! - `GET    /planlagte-hentinger?henteplan_id=&partner_id=&stasjon_id=&fra=&til=`
//! - `GET    /planlagte-hentinger/:id`, `PATCH /planlagte-hentinger/:id`
//! - `POST   /ekstra-hentinger`, `GET /ekstra-hentinger?stasjon_id=&fra=&til=`
//! - `GET    /ekstra-hentinger/:id`, `PATCH /ekstra-hentinger/:id`, `DELETE /ekstra-hentinger/:id`

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Router,
};

use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::henting::{EkstraHenting, Henteplan, PlanlagtHenting};
use crate::services::henting::{
    EkstraEndring, EkstraQuery, HenteplanEndring, HenteplanQuery, NyEkstraHenting, NyHenteplan,
    PlanlagtEndring, PlanlagtQuery,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/henteplaner", get(list_henteplaner).post(create_henteplan))
        .route(
            "/henteplaner/:id",
            get(get_henteplan)
                .patch(update_henteplan)
                .delete(delete_henteplan),
        )
        .route("/planlagte-hentinger", get(list_planlagte))
        .route(
            "/planlagte-hentinger/:id",
            get(get_planlagt).patch(update_planlagt),
        )
        .route("/ekstra-hentinger", get(list_ekstra).post(create_ekstra))
        .route(
            "/ekstra-hentinger/:id",
            get(get_ekstra).patch(update_ekstra).delete(delete_ekstra),
        )
}

// ---- Henteplan ----

async fn create_henteplan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyHenteplan>,
) -> Result<(StatusCode, Json<Henteplan>), AppError> {
    let created = state.hentinger.create_henteplan(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_henteplaner(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<HenteplanQuery>,
) -> Result<Json<Vec<Henteplan>>, AppError> {
    Ok(Json(state.hentinger.list_henteplaner(&identity, query).await?))
}

async fn get_henteplan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Henteplan>, AppError> {
    Ok(Json(state.hentinger.get_henteplan(&identity, id).await?))
}

async fn update_henteplan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<HenteplanEndring>,
) -> Result<Json<Henteplan>, AppError> {
    Ok(Json(
        state.hentinger.update_henteplan(&identity, id, body).await?,
    ))
}

async fn delete_henteplan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.hentinger.delete_henteplan(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Planlagte hentinger ----

async fn list_planlagte(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PlanlagtQuery>,
) -> Result<Json<Vec<PlanlagtHenting>>, AppError> {
    Ok(Json(state.hentinger.list_planlagte(&identity, query).await?))
}

async fn get_planlagt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<PlanlagtHenting>, AppError> {
    Ok(Json(state.hentinger.get_planlagt(&identity, id).await?))
}

async fn update_planlagt(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<PlanlagtEndring>,
) -> Result<Json<PlanlagtHenting>, AppError> {
    Ok(Json(
        state.hentinger.update_planlagt(&identity, id, body).await?,
    ))
}

// ---- Ekstra hentinger ----

async fn create_ekstra(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyEkstraHenting>,
) -> Result<(StatusCode, Json<EkstraHenting>), AppError> {
    let created = state.hentinger.create_ekstra(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_ekstra(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EkstraQuery>,
) -> Result<Json<Vec<EkstraHenting>>, AppError> {
    Ok(Json(state.hentinger.list_ekstra(&identity, query).await?))
}

async fn get_ekstra(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<EkstraHenting>, AppError> {
    Ok(Json(state.hentinger.get_ekstra(&identity, id).await?))
}

async fn update_ekstra(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<EkstraEndring>,
) -> Result<Json<EkstraHenting>, AppError> {
    Ok(Json(state.hentinger.update_ekstra(&identity, id, body).await?))
}

async fn delete_ekstra(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.hentinger.delete_ekstra(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::{json, Value};

    use crate::api::testing::TestApp;
    use crate::services::partner::NyPartner;
    use crate::services::stasjon::NyStasjon;

    struct Seeded {
        app: TestApp,
        partner_id: i64,
        stasjon_id: i64,
    }

    async fn seeded() -> Seeded {
        let app = TestApp::new(routes()).await;
        let admin = Identity::admin();
        let partner = app
            .state
            .partnere
            .create(
                &admin,
                NyPartner {
                    navn: "Fretex".into(),
                    ideell: true,
                    storrelse: Default::default(),
                },
            )
            .await
            .unwrap();
        let stasjon = app
            .state
            .stasjoner
            .create(
                &admin,
                NyStasjon {
                    navn: "Haraldrud".into(),
                    stasjonstype: Default::default(),
                },
            )
            .await
            .unwrap();
        Seeded {
            app,
            partner_id: partner.id,
            stasjon_id: stasjon.id,
        }
    }

    /// Five Mondays in March 2027.
    fn weekly_plan(s: &Seeded) -> Value {
        json!({
            "partner_id": s.partner_id,
            "stasjon_id": s.stasjon_id,
            "frekvens": "UKENTLIG",
            "start_tidspunkt": "2027-03-01T08:00:00Z",
            "slutt_tidspunkt": "2027-03-29T10:00:00Z",
            "ukedag": 1,
        })
    }

    async fn planlagte(s: &Seeded, plan_id: &Value) -> Vec<Value> {
        let (status, json) = s
            .app
            .call(
                &Identity::admin(),
                Method::GET,
                &format!("/planlagte-hentinger?henteplan_id={}", plan_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        json.as_array().unwrap().clone()
    }

    #[tokio::test]
    async fn weekly_plan_generates_hentinger() {
        let s = seeded().await;
        let (status, plan) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(weekly_plan(&s)))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let hentinger = planlagte(&s, &plan["id"]).await;
        assert_eq!(hentinger.len(), 5);
        assert_eq!(hentinger[0]["start_tidspunkt"], "2027-03-01T08:00:00Z");
        assert_eq!(hentinger[4]["slutt_tidspunkt"], "2027-03-29T10:00:00Z");
    }

    #[tokio::test]
    async fn planlagte_filter_by_period() {
        let s = seeded().await;
        let (_, plan) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(weekly_plan(&s)))
            .await;

        let (status, json) = s
            .app
            .call(
                &Identity::partner(s.partner_id),
                Method::GET,
                &format!(
                    "/planlagte-hentinger?henteplan_id={}&fra=2027-03-08T00:00:00Z&til=2027-03-22T00:00:00Z",
                    plan["id"]
                ),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shortening_plan_drops_later_hentinger() {
        let s = seeded().await;
        let (_, plan) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(weekly_plan(&s)))
            .await;

        let (status, json) = s
            .app
            .call(
                &Identity::admin(),
                Method::PATCH,
                &format!("/henteplaner/{}", plan["id"]),
                Some(json!({"slutt_tidspunkt": "2027-03-16T10:00:00Z"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["slutt_tidspunkt"], "2027-03-16T10:00:00Z");
        assert_eq!(planlagte(&s, &plan["id"]).await.len(), 3);
    }

    #[tokio::test]
    async fn invalid_plan_returns_400() {
        let s = seeded().await;
        let mut body = weekly_plan(&s);
        body["ukedag"] = json!(9);
        let (status, _) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancelling_requires_aarsak() {
        let s = seeded().await;
        let (_, plan) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(weekly_plan(&s)))
            .await;
        let first = &planlagte(&s, &plan["id"]).await[0];
        let uri = format!("/planlagte-hentinger/{}", first["id"]);
        let station = Identity::stasjon(s.stasjon_id);

        let (status, _) = s
            .app
            .call(&station, Method::PATCH, &uri, Some(json!({"avlys": true})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = s
            .app
            .call(
                &station,
                Method::PATCH,
                &uri,
                Some(json!({"avlys": true, "aarsak": "Stengt for vedlikehold"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["avlyst"].is_string());
        assert_eq!(json["aarsak"], "Stengt for vedlikehold");
    }

    #[tokio::test]
    async fn other_partner_cannot_read_plan() {
        let s = seeded().await;
        let (_, plan) = s
            .app
            .call(&Identity::admin(), Method::POST, "/henteplaner", Some(weekly_plan(&s)))
            .await;
        let (status, _) = s
            .app
            .call(
                &Identity::partner(s.partner_id + 1),
                Method::GET,
                &format!("/henteplaner/{}", plan["id"]),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ekstra_is_visible_to_offered_partner_only() {
        let s = seeded().await;
        let (status, created) = s
            .app
            .call(
                &Identity::stasjon(s.stasjon_id),
                Method::POST,
                "/ekstra-hentinger",
                Some(json!({
                    "stasjon_id": s.stasjon_id,
                    "start_tidspunkt": "2027-04-05T08:00:00Z",
                    "slutt_tidspunkt": "2027-04-05T12:00:00Z",
                    "partnere": [s.partner_id],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["utlysninger"].as_array().unwrap().len(), 1);

        let (_, offered) = s
            .app
            .call(&Identity::partner(s.partner_id), Method::GET, "/ekstra-hentinger", None)
            .await;
        assert_eq!(offered.as_array().unwrap().len(), 1);
        assert!(offered[0].get("utlysninger").is_none());

        let (_, other) = s
            .app
            .call(
                &Identity::partner(s.partner_id + 1),
                Method::GET,
                "/ekstra-hentinger",
                None,
            )
            .await;
        assert!(other.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ekstra_patch_and_delete() {
        let s = seeded().await;
        let admin = Identity::admin();
        let (_, created) = s
            .app
            .call(
                &admin,
                Method::POST,
                "/ekstra-hentinger",
                Some(json!({
                    "stasjon_id": s.stasjon_id,
                    "start_tidspunkt": "2027-04-05T08:00:00Z",
                    "slutt_tidspunkt": "2027-04-05T12:00:00Z",
                })),
            )
            .await;
        let uri = format!("/ekstra-hentinger/{}", created["id"]);

        let (status, json) = s
            .app
            .call(&admin, Method::PATCH, &uri, Some(json!({"merknad": "Bruk bakinngangen"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["merknad"], "Bruk bakinngangen");

        let (status, _) = s.app.call(&admin, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = s.app.call(&admin, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
