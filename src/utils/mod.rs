//! Utilitaires transverses: validation des entrées, mots de passe,
//! pièces jointes.

pub mod file_input;
pub mod input_validation;
pub mod password_utils;
