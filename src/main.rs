//! Point d'entrée principal de l'application.
//! Ouvre la base de données, prépare le service et démarre le serveur web
//! avec Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use log::{error, info};
use tokio::sync::RwLock;

use telemed::backend::router::get_router;
use telemed::consts::{DB_PATH, HTTP_PORT};
use telemed::db::Database;
use telemed::services::Service;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement
    dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let db = match Database::open(DB_PATH.into()) {
        Ok(db) => db,
        Err(e) => {
            error!("Impossible d'ouvrir la base de données: {e}");
            std::process::exit(1);
        }
    };
    let mut service = Service::new(db);

    // Base vierge: émettre un premier code pour permettre la première
    // inscription (les suivants sont émis par les médecins en place)
    if service.list_doctors().next().is_none() {
        let code = service.issue_registration_code(None);
        info!("Aucun médecin inscrit, code d'amorçage: {code}");
        if let Err(e) = service.save() {
            error!("Impossible de sauvegarder le code d'amorçage: {e}");
        }
    }

    let service = Arc::new(RwLock::new(service));
    let app = get_router(Arc::clone(&service));

    // Sauvegarder la base à l'arrêt du serveur
    let on_shutdown = Arc::clone(&service);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = on_shutdown.read().await.save() {
                error!("Erreur lors de la sauvegarde de la base: {e}");
            }
            std::process::exit(0);
        }
    });

    // Démarrer le serveur web
    let addr = SocketAddr::from(([0, 0, 0, 0], HTTP_PORT));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to open web server listener");

    axum::serve(listener, app)
        .await
        .expect("Failed to bind Axum to listener");
}
