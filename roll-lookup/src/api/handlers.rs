use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::resolver::{Outcome, Resolution};
use crate::service::LookupService;
use crate::types::{KeyField, LookupQuery};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultaRequest {
    pub citizen_id: String,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default, rename = "fn")]
    pub given_name: Option<String>,
    #[serde(default, rename = "sn1")]
    pub surname1: Option<String>,
    #[serde(default, rename = "sn2")]
    pub surname2: Option<String>,
    #[serde(default)]
    pub post_code: Option<String>,
    #[serde(default, rename = "colele")]
    pub station: Option<String>,
}

impl From<ConsultaRequest> for LookupQuery {
    fn from(request: ConsultaRequest) -> Self {
        LookupQuery {
            citizen_id: request.citizen_id,
            day: request.day,
            year: request.year,
            given_name: request.given_name,
            surname1: request.surname1,
            surname2: request.surname2,
            post_code: request.post_code,
            station: request.station,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationResponse {
    pub poblacion: String,
    pub distrito: String,
    pub seccion: String,
    pub mesa: String,
    pub colele: String,
    pub dircol: String,
    pub error_message: String,
}

impl From<Resolution> for StationResponse {
    fn from(resolution: Resolution) -> Self {
        let station = resolution.station;
        StationResponse {
            poblacion: station.locality,
            distrito: station.district,
            seccion: station.section,
            mesa: station.table,
            colele: station.id,
            dircol: station.address,
            error_message: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupFailure {
    pub error_message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differing_fields: Option<Vec<KeyField>>,
}

pub async fn consulta(
    State(service): State<LookupService>,
    payload: Result<Json<ConsultaRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let query = LookupQuery::from(request);

    let response = match service.resolve(&query).await? {
        Outcome::Resolved(resolution) => {
            (StatusCode::OK, Json(StationResponse::from(resolution))).into_response()
        }
        Outcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(LookupFailure {
                error_message: "No match found",
                differing_fields: None,
            }),
        )
            .into_response(),
        Outcome::Ambiguous(fields) => (
            StatusCode::CONFLICT,
            Json(LookupFailure {
                error_message: "Ambiguous match",
                differing_fields: Some(fields),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

pub async fn readiness(State(service): State<LookupService>) -> StatusCode {
    service.readiness().check().await
}

pub async fn liveness() -> &'static str {
    "ok"
}
