//! Types d'entrée validés pour l'API.
//!
//! Chaque type ne peut être construit qu'à travers sa validation, ce qui
//! garantit qu'une instance respecte toujours ses contraintes de format.

use ammonia::is_html;
use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use validator::{ValidateEmail, ValidateNonControlCharacter};
use zxcvbn::{zxcvbn, Score};

/// Longueur maximale d'un contenu long (rapport, raison, historique)
pub const MAX_CONTENT_LENGTH: usize = 2_000;
/// Longueur maximale d'un contenu court (nom, titre, spécialité)
pub const MAX_SHORT_CONTENT_LENGTH: usize = 250;

static MIN_PASSWORD_SCORE: Score = Score::Three;

// Numéro de licence: 4 à 20 caractères alphanumériques, tirets permis
static LICENSE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{3,19}$").expect("Failed to compile license regex")
});

#[derive(Debug, Clone, Copy, Error)]
#[error("Entrée invalide")]
pub struct InvalidInput;

/// Une adresse email validée et normalisée en minuscules
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailInput(String);

impl EmailInput {
    pub fn new(email: &str) -> Result<Self> {
        let trimmed = email.trim();

        if trimmed.is_empty() {
            bail!("Email address cannot be empty");
        }

        if trimmed.len() > 254 {
            bail!("Email address exceeds maximum length of 254 characters");
        }

        if !trimmed.validate_email() {
            bail!("Invalid email format");
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EmailInput {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Un contenu textuel validé: non vide, sans caractère de contrôle,
/// sans HTML, normalisé NFKC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextInput(String);

impl TextInput {
    /// Contenu long (rapports, raisons de consultation, posts du forum)
    pub fn new_long_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_CONTENT_LENGTH)
    }

    /// Contenu court (noms, titres, spécialités)
    pub fn new_short_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_SHORT_CONTENT_LENGTH)
    }

    fn new(content: &str, max_length: usize) -> Result<Self> {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            bail!("Content cannot be empty");
        }

        if trimmed.len() > max_length {
            bail!("Content exceeds maximum length of {} characters", max_length);
        }

        if !trimmed.validate_non_control_character() {
            bail!("Content contains invalid control characters");
        }

        if is_html(trimmed) {
            bail!("Content cannot contain HTML");
        }

        Ok(Self(trimmed.nfkc().collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TextInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TextInput {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Un numéro de licence médicale validé
#[derive(
    Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
pub struct LicenseNumber(String);

impl TryFrom<String> for LicenseNumber {
    type Error = InvalidInput;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if LICENSE_REGEX.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidInput)
        }
    }
}

impl TryFrom<&str> for LicenseNumber {
    type Error = InvalidInput;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl AsRef<str> for LicenseNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Vérifie la solidité d'un mot de passe d'inscription.
/// L'email sert d'entrée au dictionnaire de zxcvbn pour refuser les mots
/// de passe dérivés de l'identifiant.
pub fn password_validation(password: &str, email: &str) -> bool {
    if password.eq_ignore_ascii_case(email) {
        return false;
    }

    if password.len() < 8 || password.len() > 64 {
        return false;
    }

    zxcvbn(password, &[email]).score() >= MIN_PASSWORD_SCORE
}
