//! Module principal pour le backend de l'application.
//! Contient les gestionnaires pour les routes, les modèles d'échange,
//! le routeur, et les middlewares.
pub mod errors;
pub mod handlers_auth;
pub mod handlers_unauth;
pub mod middlewares;
mod models;
pub mod router;
