//! Jetons de session opaques, conservés en mémoire côté serveur.
//!
//! Un jeton n'encode rien: c'est une valeur aléatoire qui indexe la session
//! dans les tables ci-dessous. Chaque entrée connaît son jeton jumeau, si
//! bien que la déconnexion invalide la paire entière et que le
//! rafraîchissement retire l'ancienne paire avant d'émettre la nouvelle.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::AccountId;

/// Une moitié de paire: le compte et le jeton jumeau
struct Session {
    account: AccountId,
    counterpart: String,
}

static ACCESS_TOKENS: Lazy<RwLock<HashMap<String, Session>>> = Lazy::new(Default::default);
static REFRESH_TOKENS: Lazy<RwLock<HashMap<String, Session>>> = Lazy::new(Default::default);

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Émet une nouvelle paire de jetons pour un compte
pub async fn issue(account: AccountId) -> TokenPair {
    let pair = TokenPair {
        access: Uuid::new_v4().to_string(),
        refresh: Uuid::new_v4().to_string(),
    };

    ACCESS_TOKENS.write().await.insert(
        pair.access.clone(),
        Session {
            account,
            counterpart: pair.refresh.clone(),
        },
    );
    REFRESH_TOKENS.write().await.insert(
        pair.refresh.clone(),
        Session {
            account,
            counterpart: pair.access.clone(),
        },
    );
    pair
}

/// Résout un jeton d'accès vers son compte
pub async fn resolve(access: &str) -> Option<AccountId> {
    ACCESS_TOKENS.read().await.get(access).map(|s| s.account)
}

/// Échange un jeton de rafraîchissement contre une nouvelle paire.
/// L'ancienne paire est retirée en entier: le jeton d'accès remplacé
/// cesse de résoudre immédiatement.
pub async fn refresh(refresh: &str) -> Option<TokenPair> {
    let session = REFRESH_TOKENS.write().await.remove(refresh)?;
    ACCESS_TOKENS.write().await.remove(&session.counterpart);
    Some(issue(session.account).await)
}

/// Invalide la paire entière à partir du jeton d'accès
pub async fn revoke(access: &str) {
    if let Some(session) = ACCESS_TOKENS.write().await.remove(access) {
        REFRESH_TOKENS.write().await.remove(&session.counterpart);
    }
}
