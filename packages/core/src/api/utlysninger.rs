//! Routes:
//! - `POST   /utlysninger`, `POST /utlysninger/batch`
//! - `GET    /utlysninger?partner_id=&henting_id=&pameldt=`
//! - `GET    /utlysninger/:id`, `DELETE /utlysninger/:id`
//! - `PATCH  /utlysninger/:id/pamelding`   partner sign-up / withdrawal
//! - `PATCH  /utlysninger/:id/godkjenning` station approval
//! - `PATCH  /utlysninger/:id/synlighet`   partner hide / seen flags

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Router,
};

use super::extract::{Json, Path, Query};
use super::AppState;
use crate::auth::Identity;
use crate::error::AppError;
use crate::repository::utlysning::Utlysning;
use crate::services::utlysning::{
    Godkjenning, NyUtlysning, Pamelding, SynlighetEndring, UtlysningBatch, UtlysningQuery,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/utlysninger", get(list_utlysninger).post(create_utlysning))
        .route("/utlysninger/batch", post(create_batch))
        .route(
            "/utlysninger/:id",
            get(get_utlysning).delete(delete_utlysning),
        )
        .route("/utlysninger/:id/pamelding", patch(pamelding))
        .route("/utlysninger/:id/godkjenning", patch(godkjenning))
        .route("/utlysninger/:id/synlighet", patch(synlighet))
}

async fn create_utlysning(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<NyUtlysning>,
) -> Result<(StatusCode, Json<Utlysning>), AppError> {
    let created = state.utlysninger.create(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_batch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<UtlysningBatch>,
) -> Result<(StatusCode, Json<Vec<Utlysning>>), AppError> {
    let created = state.utlysninger.create_batch(&identity, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_utlysninger(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<UtlysningQuery>,
) -> Result<Json<Vec<Utlysning>>, AppError> {
    Ok(Json(state.utlysninger.list(&identity, query).await?))
}

async fn get_utlysning(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Utlysning>, AppError> {
    Ok(Json(state.utlysninger.get(&identity, id).await?))
}

async fn delete_utlysning(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.utlysninger.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pamelding(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<Pamelding>,
) -> Result<Json<Utlysning>, AppError> {
    Ok(Json(state.utlysninger.pamelding(&identity, id, body).await?))
}

async fn godkjenning(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<Godkjenning>,
) -> Result<Json<Utlysning>, AppError> {
    Ok(Json(
        state.utlysninger.godkjenning(&identity, id, body).await?,
    ))
}

async fn synlighet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<SynlighetEndring>,
) -> Result<Json<Utlysning>, AppError> {
    Ok(Json(state.utlysninger.synlighet(&identity, id, body).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use crate::api::testing::TestApp;
    use crate::services::henting::NyEkstraHenting;
    use crate::services::partner::NyPartner;
    use crate::services::stasjon::NyStasjon;

    struct Seeded {
        app: TestApp,
        stasjon_id: i64,
        henting_id: i64,
        a: i64,
        b: i64,
    }

    /// One station, two partners and an ekstra henting tomorrow.
    async fn seeded() -> Seeded {
        let app = TestApp::new(routes()).await;
        let admin = Identity::admin();
        let mut partners = Vec::new();
        for navn in ["Fretex", "Kirkens Bymisjon"] {
            let p = app
                .state
                .partnere
                .create(
                    &admin,
                    NyPartner {
                        navn: navn.into(),
                        ideell: true,
                        storrelse: Default::default(),
                    },
                )
                .await
                .unwrap();
            partners.push(p.id);
        }
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
        let start = Utc::now() + Duration::days(1);
        let henting = app
            .state
            .hentinger
            .create_ekstra(
                &admin,
                NyEkstraHenting {
                    stasjon_id: stasjon.id,
                    start_tidspunkt: start,
                    slutt_tidspunkt: start + Duration::hours(2),
                    merknad: None,
                    kategorier: Vec::new(),
                    partnere: Vec::new(),
                },
            )
            .await
            .unwrap();
        Seeded {
            app,
            stasjon_id: stasjon.id,
            henting_id: henting.id,
            a: partners[0],
            b: partners[1],
        }
    }

    async fn offer_both(s: &Seeded) -> Vec<i64> {
        let (status, json) = s
            .app
            .call(
                &Identity::stasjon(s.stasjon_id),
                Method::POST,
                "/utlysninger/batch",
                Some(json!({"henting_id": s.henting_id, "partner_ids": [s.a, s.b]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        json.as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn accept_then_approve() {
        let s = seeded().await;
        let ids = offer_both(&s).await;

        let (status, json) = s
            .app
            .call(
                &Identity::partner(s.a),
                Method::PATCH,
                &format!("/utlysninger/{}/pamelding", ids[0]),
                Some(json!({"to_accept": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["partner_pameldt"].is_string());
        assert_eq!(s.app.state.metrics.utlysning_pameldinger_total.get(), 1.0);

        let (status, json) = s
            .app
            .call(
                &Identity::stasjon(s.stasjon_id),
                Method::PATCH,
                &format!("/utlysninger/{}/godkjenning", ids[0]),
                Some(json!({"to_approve": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["stasjon_godkjent"].is_string());
    }

    #[tokio::test]
    async fn second_partner_gets_409_and_loses_visibility() {
        let s = seeded().await;
        let ids = offer_both(&s).await;
        s.app
            .call(
                &Identity::partner(s.a),
                Method::PATCH,
                &format!("/utlysninger/{}/pamelding", ids[0]),
                Some(json!({"to_accept": true})),
            )
            .await;

        let (status, _) = s
            .app
            .call(
                &Identity::partner(s.b),
                Method::PATCH,
                &format!("/utlysninger/{}/pamelding", ids[1]),
                Some(json!({"to_accept": true})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, visible) = s
            .app
            .call(&Identity::partner(s.b), Method::GET, "/utlysninger", None)
            .await;
        assert!(visible.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_without_sign_up_returns_400() {
        let s = seeded().await;
        let ids = offer_both(&s).await;
        let (status, _) = s
            .app
            .call(
                &Identity::admin(),
                Method::PATCH,
                &format!("/utlysninger/{}/godkjenning", ids[1]),
                Some(json!({"to_approve": true})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partner_cannot_accept_for_someone_else() {
        let s = seeded().await;
        let ids = offer_both(&s).await;
        let (status, _) = s
            .app
            .call(
                &Identity::partner(s.b),
                Method::PATCH,
                &format!("/utlysninger/{}/pamelding", ids[0]),
                Some(json!({"to_accept": true})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn hidden_offer_drops_out_of_partner_list() {
        let s = seeded().await;
        let ids = offer_both(&s).await;
        let me = Identity::partner(s.a);

        let (status, json) = s
            .app
            .call(
                &me,
                Method::PATCH,
                &format!("/utlysninger/{}/synlighet", ids[0]),
                Some(json!({"skjult": true, "vist": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["partner_skjult"], true);
        assert_eq!(json["partner_vist"], true);

        let (_, list) = s.app.call(&me, Method::GET, "/utlysninger", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_offer_returns_409() {
        let s = seeded().await;
        let body = json!({"partner_id": s.a, "henting_id": s.henting_id});
        let (status, _) = s
            .app
            .call(&Identity::admin(), Method::POST, "/utlysninger", Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = s
            .app
            .call(&Identity::admin(), Method::POST, "/utlysninger", Some(body))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn station_deletes_offer() {
        let s = seeded().await;
        let ids = offer_both(&s).await;
        let uri = format!("/utlysninger/{}", ids[0]);
        let station = Identity::stasjon(s.stasjon_id);

        let (status, _) = s.app.call(&station, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = s
            .app
            .call(
                &station,
                Method::GET,
                &format!("/utlysninger?henting_id={}", s.henting_id),
                None,
            )
            .await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}
