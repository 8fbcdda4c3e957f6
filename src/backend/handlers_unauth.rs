//! Gestion des routes accessibles sans authentification.
//! Contient les handlers pour l'inscription des médecins, la connexion et
//! le rafraîchissement des jetons.

use axum::extract::State;
use axum::Json;
use http::StatusCode;
use log::{info, warn};
use serde_json::json;

use crate::backend::errors::ApiError;
use crate::backend::models::{DoctorProfile, LoginRequest, RefreshRequest, RegisterDoctorRequest};
use crate::backend::router::AppState;
use crate::services::DoctorRegistration;
use crate::tokens;
use crate::utils::input_validation::{EmailInput, LicenseNumber, TextInput};

/// Inscription d'un médecin, contrôlée par un code d'enregistrement
pub async fn register_doctor(
    State(state): State<AppState>,
    Json(payload): Json<RegisterDoctorRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let email = EmailInput::new(&payload.email)
        .map_err(|e| ApiError::Validation("email", e.to_string()))?;
    let first_name = TextInput::new_short_form(&payload.first_name)
        .map_err(|e| ApiError::Validation("first_name", e.to_string()))?;
    let last_name = TextInput::new_short_form(&payload.last_name)
        .map_err(|e| ApiError::Validation("last_name", e.to_string()))?;
    let license_number = LicenseNumber::try_from(payload.license_number)
        .map_err(|e| ApiError::Validation("license_number", e.to_string()))?;
    let specialty = payload
        .specialty
        .map(|s| TextInput::new_short_form(&s))
        .transpose()
        .map_err(|e| ApiError::Validation("specialty", e.to_string()))?;

    let mut service = state.service.write().await;
    let doctor = service.register_doctor(DoctorRegistration {
        email,
        password: payload.password,
        first_name: first_name.into_inner(),
        last_name: last_name.into_inner(),
        license_number,
        specialty: specialty.map(TextInput::into_inner),
        workplaces: payload.workplaces,
        registration_code: payload.registration_code,
    })?;
    if let Err(e) = service.save() {
        warn!("Échec de la sauvegarde de la base: {e}");
    }

    info!("Nouveau médecin inscrit: {doctor}");
    Ok((StatusCode::CREATED, Json(json!({ "id": doctor }))))
}

/// Connexion par email et mot de passe, réservée aux médecins
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.service.read().await;
    let (account, doctor) = service.login(&payload.email, &payload.password)?;
    let profile = DoctorProfile::from_records(account, doctor);
    let account_id = account.id;
    drop(service);

    let pair = tokens::issue(account_id).await;
    Ok(Json(json!({
        "access": pair.access,
        "refresh": pair.refresh,
        "doctor": profile,
    })))
}

/// Rotation d'une paire de jetons
pub async fn refresh_token(
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<tokens::TokenPair>, ApiError> {
    let pair = tokens::refresh(&payload.refresh)
        .await
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Json(pair))
}
