//! Traduction des erreurs du service en réponses HTTP.
//!
//! Les erreurs de validation et les conflits portent le champ fautif, format
//! `{"champ": ["message"]}`. Les refus d'accès et les absences portent un
//! `{"detail": "..."}`. Hors périmètre et inexistant partagent le même 404.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use axum::Json;
use log::error;
use serde_json::json;

use crate::services::{LoginError, ServiceError};

#[derive(Debug)]
pub enum ApiError {
    /// Jeton absent, inconnu ou révoqué
    Unauthenticated,
    /// Erreur de validation sur un champ nommé
    Validation(&'static str, String),
    Service(ServiceError),
    Login(LoginError),
    Internal,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        ApiError::Login(err)
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn field_error(field: &str, message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ field: [message] }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => {
                detail(StatusCode::UNAUTHORIZED, "Authentification requise.")
            }

            ApiError::Validation(field, message) => field_error(field, &message),

            ApiError::Service(err) => match &err {
                ServiceError::AccessDenied(_) | ServiceError::NotADoctor => {
                    detail(StatusCode::FORBIDDEN, &err.to_string())
                }
                ServiceError::NotFound => detail(StatusCode::NOT_FOUND, &err.to_string()),
                ServiceError::InvalidRegistrationCode | ServiceError::CodeEmailMismatch => {
                    field_error("registration_code", &err.to_string())
                }
                ServiceError::EmailTaken => field_error("email", &err.to_string()),
                ServiceError::LicenseTaken => field_error("license_number", &err.to_string()),
                ServiceError::WorkplaceNameTaken => field_error("name", &err.to_string()),
                ServiceError::WeakPassword => field_error("password", &err.to_string()),
            },

            ApiError::Login(err) => match &err {
                LoginError::InvalidCredentials => {
                    detail(StatusCode::UNAUTHORIZED, &err.to_string())
                }
                LoginError::NotADoctor => detail(StatusCode::FORBIDDEN, &err.to_string()),
            },

            ApiError::Internal => {
                error!("Erreur interne inattendue");
                detail(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erreur interne du serveur.",
                )
            }
        }
    }
}
