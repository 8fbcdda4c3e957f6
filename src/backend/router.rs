//! Configuration des routes pour l'application.
//! Définit les routes accessibles avec ou sans authentification et partage
//! le service entre les handlers.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::backend::handlers_auth::{
    create_appointment, create_consultation, create_forum_comment, create_forum_post, create_note,
    create_patient, create_procedure, create_referral, create_workplace, delete_appointment,
    delete_consultation, delete_forum_comment, delete_forum_post, delete_note, delete_procedure,
    delete_referral, delete_workplace, get_appointment, get_consultation, get_doctor,
    get_forum_post, get_note, get_patient, get_procedure, get_profile, get_referral,
    get_workplace, global_stats, list_appointments, list_consultations, list_deleted_appointments,
    list_doctors, list_forum_comments, list_forum_posts, list_notes, list_patients,
    list_procedures, list_referrals, list_workplaces, logout, my_patient_stats, my_patients,
    my_stats, update_appointment, update_consultation, update_forum_comment, update_forum_post,
    update_note, update_patient, update_procedure, update_profile, update_referral,
    update_workplace, upload_consultation_attachment, workplace_statistics,
};
use crate::backend::handlers_unauth::{login, refresh_token, register_doctor};
use crate::services::Service;

/// L'état partagé du serveur: le service derrière un verrou
/// lecteurs-rédacteur unique
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RwLock<Service>>,
}

/// Initialisation du routeur principal et des middlewares
pub fn get_router(service: Arc<RwLock<Service>>) -> Router {
    let router = Router::new().merge(unauth_routes()).merge(auth_routes());

    // Configuration CORS pour permettre les requêtes de n'importe quelle
    // origine (en mode debug uniquement)
    let router = if cfg!(debug_assertions) {
        let cors = CorsLayer::new()
            .allow_methods(tower_http::cors::AllowMethods::any())
            .allow_headers(Any)
            .allow_origin(Any);
        router.layer(cors)
    } else {
        router
    };

    router.with_state(AppState { service })
}

/// Routes accessibles sans authentification
fn unauth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/register/doctor", post(register_doctor))
        .route("/api/login", post(login))
        .route("/api/token/refresh", post(refresh_token))
}

/// Routes nécessitant un médecin authentifié. Le contrôle est porté par
/// l'extracteur `AuthDoctor` présent dans chaque handler.
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/logout", post(logout))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/doctors", get(list_doctors))
        .route("/api/doctors/:id", get(get_doctor))
        .route("/api/doctors/me/patients", get(my_patients))
        .route("/api/patients", get(list_patients).post(create_patient))
        .route("/api/patients/:id", get(get_patient).put(update_patient))
        .route(
            "/api/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route(
            "/api/appointments/deleted",
            get(list_deleted_appointments),
        )
        .route(
            "/api/appointments/:id",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route(
            "/api/consultations",
            get(list_consultations).post(create_consultation),
        )
        .route(
            "/api/consultations/:id",
            get(get_consultation)
                .put(update_consultation)
                .delete(delete_consultation),
        )
        .route(
            "/api/consultations/:id/attachment",
            post(upload_consultation_attachment),
        )
        .route(
            "/api/medical-procedures",
            get(list_procedures).post(create_procedure),
        )
        .route(
            "/api/medical-procedures/:id",
            get(get_procedure)
                .put(update_procedure)
                .delete(delete_procedure),
        )
        .route("/api/referrals", get(list_referrals).post(create_referral))
        .route(
            "/api/referrals/:id",
            get(get_referral).put(update_referral).delete(delete_referral),
        )
        .route(
            "/api/workplaces",
            get(list_workplaces).post(create_workplace),
        )
        .route(
            "/api/workplaces/:id",
            get(get_workplace)
                .put(update_workplace)
                .delete(delete_workplace),
        )
        .route(
            "/api/workplaces/:id/statistics",
            get(workplace_statistics),
        )
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/:id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route(
            "/api/forum/posts",
            get(list_forum_posts).post(create_forum_post),
        )
        .route(
            "/api/forum/posts/:id",
            get(get_forum_post)
                .put(update_forum_post)
                .delete(delete_forum_post),
        )
        .route(
            "/api/forum/comments",
            get(list_forum_comments).post(create_forum_comment),
        )
        .route(
            "/api/forum/comments/:id",
            axum::routing::put(update_forum_comment).delete(delete_forum_comment),
        )
        .route("/api/doctors/stats", get(my_stats))
        .route("/api/doctors/patients/stats", get(my_patient_stats))
        .route("/api/stats/global", get(global_stats))
}
