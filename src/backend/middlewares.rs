//! Extraction du médecin authentifié depuis l'en-tête Authorization.
//!
//! L'extracteur combine les deux contrôles d'entrée: le jeton doit résoudre
//! vers un compte (401 sinon), et le compte doit porter un profil médecin
//! (403 sinon). Aucun handler protégé ne s'exécute sans les deux.

use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;

use crate::backend::errors::ApiError;
use crate::backend::router::AppState;
use crate::models::{AccountId, DoctorId};
use crate::tokens;

/// Le principal authentifié, résolu vers son profil médecin
pub struct AuthDoctor {
    pub account: AccountId,
    pub doctor: DoctorId,
    pub token: String,
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthDoctor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthenticated)?;

        let account = tokens::resolve(token)
            .await
            .ok_or(ApiError::Unauthenticated)?;

        let doctor = state.service.read().await.doctor_for(account)?;

        Ok(AuthDoctor {
            account,
            doctor,
            token: token.to_string(),
        })
    }
}
