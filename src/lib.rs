//! Serveur de dossier médical partagé: comptes médecins à inscription
//! contrôlée, patients à visibilité périmétrée, et archivage des
//! suppressions de rendez-vous.

pub mod authorization;
pub mod backend;
pub mod consts;
pub mod db;
pub mod models;
pub mod services;
pub mod tokens;
pub mod utils;
