//! Contrôle des mutations par ressource.
//!
//! La table de capacités est déclarative: chaque type de ressource implémente
//! [`Mutate`] avec son prédicat de propriété, et le [`Context`] lié à un
//! sujet applique ce prédicat avant toute modification ou suppression.
//!
//! | Ressource        | Create          | Update/Delete            |
//! |------------------|-----------------|--------------------------|
//! | Workplace        | tout médecin    | créateur uniquement      |
//! | Appointment      | tout médecin    | médecin propriétaire     |
//! | Consultation     | tout médecin    | médecin propriétaire     |
//! | MedicalProcedure | tout médecin    | médecin opérateur        |
//! | Referral         | tout médecin    | les deux parties         |
//! | Note             | tout médecin    | médecin auteur           |
//! | Forum            | tout médecin    | tout médecin             |
//!
//! La lecture n'est pas traitée ici: elle passe par les ensembles de
//! visibilité du service, qui renvoient "introuvable" hors périmètre.

use log::info;
use thiserror::Error;

use crate::models::{
    Appointment, Consultation, DoctorId, ForumComment, ForumPost, MedicalProcedure, Note, Referral,
    Workplace,
};

/// Une erreur sans détails en cas d'accès refusé
#[derive(Debug, Error)]
#[error("Accès refusé.")]
pub struct AccessDenied;

type GuardResult = Result<(), AccessDenied>;

/// Prédicat de mutation d'une ressource: qui a le droit de la modifier
/// ou de la supprimer.
pub trait Mutate {
    /// Nom de la ressource, pour la journalisation des décisions
    const RESOURCE: &'static str;

    fn may_mutate(&self, subject: DoctorId) -> bool;
}

impl Mutate for Workplace {
    const RESOURCE: &'static str = "workplace";

    // Création ouverte, modification réservée au créateur
    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.creator == Some(subject)
    }
}

impl Mutate for Appointment {
    const RESOURCE: &'static str = "appointment";

    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.doctor == subject
    }
}

impl Mutate for Consultation {
    const RESOURCE: &'static str = "consultation";

    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.doctor == subject
    }
}

impl Mutate for MedicalProcedure {
    const RESOURCE: &'static str = "medical_procedure";

    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.operator == Some(subject)
    }
}

impl Mutate for Referral {
    const RESOURCE: &'static str = "referral";

    // Les deux parties peuvent éditer le référencement, y compris le texte
    // du référent. Comportement conservé tel quel.
    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.referred_by == Some(subject) || self.referred_to == subject
    }
}

impl Mutate for Note {
    const RESOURCE: &'static str = "note";

    fn may_mutate(&self, subject: DoctorId) -> bool {
        self.author == subject
    }
}

impl Mutate for ForumPost {
    const RESOURCE: &'static str = "forum_post";

    // Le forum est un espace commun entre confrères: tout médecin
    // authentifié peut éditer les posts
    fn may_mutate(&self, _subject: DoctorId) -> bool {
        true
    }
}

impl Mutate for ForumComment {
    const RESOURCE: &'static str = "forum_comment";

    fn may_mutate(&self, _subject: DoctorId) -> bool {
        true
    }
}

/// Point d'application de la table de capacités
#[derive(Debug, Default)]
pub struct Guard;

impl Guard {
    pub fn with_subject(&self, subject: DoctorId) -> Context {
        Context { subject }
    }
}

/// Un contexte d'autorisation lié à un sujet médecin
pub struct Context {
    subject: DoctorId,
}

impl Context {
    pub fn mutate<R: Mutate>(&self, resource: &R) -> GuardResult {
        let granted = resource.may_mutate(self.subject);
        info!(
            "Mutation {} par {}: {}",
            R::RESOURCE,
            self.subject,
            if granted { "accordée" } else { "refusée" }
        );

        if granted {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, NoteId, PatientId, ReferralId, WorkplaceId};
    use chrono::Utc;

    fn create_test_workplace(creator: Option<DoctorId>) -> Workplace {
        Workplace {
            id: WorkplaceId::new(),
            name: "Clinique des Tests".to_string(),
            address: "1 rue des Essais".to_string(),
            is_public: true,
            creator,
        }
    }

    fn create_test_referral(referred_by: Option<DoctorId>, referred_to: DoctorId) -> Referral {
        Referral {
            id: ReferralId::new(),
            patient: PatientId::new(),
            referred_to,
            referred_by,
            specialty_requested: "Cardiologie".to_string(),
            reason_for_referral: "Souffle systolique".to_string(),
            attached_documents: None,
            date_of_referral: Utc::now(),
            comments: None,
        }
    }

    #[test]
    fn test_workplace_creator_only() {
        let guard = Guard;
        let creator = DoctorId::new();
        let other = DoctorId::new();
        let workplace = create_test_workplace(Some(creator));

        assert!(
            guard.with_subject(creator).mutate(&workplace).is_ok(),
            "The creator should be allowed to mutate their workplace"
        );
        assert!(
            guard.with_subject(other).mutate(&workplace).is_err(),
            "A doctor who did not create the workplace should be rejected"
        );
    }

    #[test]
    fn test_workplace_without_creator_is_frozen() {
        let guard = Guard;
        let workplace = create_test_workplace(None);

        assert!(
            guard.with_subject(DoctorId::new()).mutate(&workplace).is_err(),
            "A workplace whose creator is gone should not be mutable by anyone"
        );
    }

    #[test]
    fn test_appointment_owner_only() {
        let guard = Guard;
        let owner = DoctorId::new();
        let appointment = Appointment {
            id: crate::models::AppointmentId::new(),
            patient: PatientId::new(),
            doctor: owner,
            workplace: None,
            appointment_date: Utc::now(),
            reason_for_appointment: "Contrôle annuel".to_string(),
            status: AppointmentStatus::Pending,
        };

        assert!(guard.with_subject(owner).mutate(&appointment).is_ok());
        assert!(guard.with_subject(DoctorId::new()).mutate(&appointment).is_err());
    }

    #[test]
    fn test_referral_both_parties_may_edit() {
        let guard = Guard;
        let referrer = DoctorId::new();
        let recipient = DoctorId::new();
        let referral = create_test_referral(Some(referrer), recipient);

        assert!(
            guard.with_subject(referrer).mutate(&referral).is_ok(),
            "The referring doctor should be allowed to edit the referral"
        );
        assert!(
            guard.with_subject(recipient).mutate(&referral).is_ok(),
            "The receiving doctor should also be allowed to edit the referral"
        );
        assert!(
            guard.with_subject(DoctorId::new()).mutate(&referral).is_err(),
            "A doctor who is neither party should be rejected"
        );
    }

    #[test]
    fn test_note_author_only() {
        let guard = Guard;
        let author = DoctorId::new();
        let note = Note {
            id: NoteId::new(),
            author,
            patient: None,
            title: "Sans titre".to_string(),
            content: "Rappeler le labo".to_string(),
            created_at: Utc::now(),
        };

        assert!(guard.with_subject(author).mutate(&note).is_ok());
        assert!(guard.with_subject(DoctorId::new()).mutate(&note).is_err());
    }
}
