//! Définition des constantes globales pour l'application.

pub const HTTP_PORT: u16 = 8080; // Port par défaut pour le serveur HTTP.
pub const DB_PATH: &str = "./data/telemed.json"; // Chemin de la base de données.
pub const UPLOADS_DIR: &str = "./data/uploads"; // Dossier pour les fichiers uploadés.
