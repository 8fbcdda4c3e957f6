//! Hachage et vérification des mots de passe (Argon2id)

use std::str::FromStr;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHashString, PasswordVerifier, SaltString},
    Argon2, PasswordHasher,
};
use derive_more::Display;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static HASHER: Lazy<Argon2<'static>> = Lazy::new(Argon2::default);

/// Haché du mot de passe vide, utilisé quand le compte n'existe pas afin
/// que la vérification prenne le même temps dans les deux cas
static EMPTY_HASH: Lazy<PWHash> = Lazy::new(|| PWHash::new(""));

/// Un mot de passe haché au format PHC
#[derive(Clone, Debug, Display)]
pub struct PWHash(PasswordHashString);

impl PWHash {
    /// Hache un mot de passe en clair avec un sel aléatoire
    pub fn new(password: &str) -> Self {
        let salt = SaltString::generate(&mut OsRng);
        let hash = HASHER
            .hash_password(password.as_bytes(), &salt)
            .expect("Argon2 n'échoue pas avec ses paramètres par défaut")
            .serialize();
        PWHash(hash)
    }

    fn matches(&self, password: &str) -> bool {
        HASHER
            .verify_password(password.as_bytes(), &self.0.password_hash())
            .is_ok()
    }
}

/// Vérifie un mot de passe contre un haché optionnel. Si le compte est
/// inconnu on compare quand même contre un faux haché, sinon le temps de
/// réponse trahirait l'existence du compte.
pub fn verify(password: &str, maybe_hash: Option<&PWHash>) -> bool {
    maybe_hash.unwrap_or(&EMPTY_HASH).matches(password)
}

impl Serialize for PWHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PWHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let hash = PasswordHashString::from_str(&s)
            .map_err(|_| <D::Error as serde::de::Error>::custom("Invalid PHC string"))?;
        Ok(PWHash(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_correct_password() {
        let hash = PWHash::new("grand secret 42");
        assert!(
            verify("grand secret 42", Some(&hash)),
            "The original password should verify against its own hash"
        );
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let hash = PWHash::new("grand secret 42");
        assert!(
            !verify("petit secret", Some(&hash)),
            "A different password should not verify"
        );
    }

    #[test]
    fn test_verify_rejects_unknown_account() {
        assert!(
            !verify("whatever", None),
            "Verification without a stored hash should always fail"
        );
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = PWHash::new("same password");
        let b = PWHash::new("same password");
        assert_ne!(
            a.to_string(),
            b.to_string(),
            "Two hashes of the same password should differ because of the random salt"
        );
    }
}
