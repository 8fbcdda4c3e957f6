//! Modèle de données du dossier médical partagé.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};
use uuid::Uuid;

use crate::utils::input_validation::LicenseNumber;
use crate::utils::password_utils::PWHash;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
        )]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifiant d'un compte utilisateur (le principal authentifié)
    AccountId
);
uuid_id!(
    /// Identifiant d'un médecin
    DoctorId
);
uuid_id!(
    /// Identifiant opaque d'un patient, volontairement non séquentiel
    PatientId
);
uuid_id!(WorkplaceId);
uuid_id!(AppointmentId);
uuid_id!(DeletedAppointmentId);
uuid_id!(ConsultationId);
uuid_id!(ProcedureId);
uuid_id!(ReferralId);
uuid_id!(NoteId);
uuid_id!(PostId);
uuid_id!(CommentId);

/// Un compte utilisateur. L'authentification se fait par email et mot de
/// passe; le rôle de médecin est porté par un enregistrement `Doctor`
/// séparé qui référence ce compte.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub password: PWHash,
    pub first_name: String,
    pub last_name: String,
}

impl Account {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Le profil d'un médecin, lié un-à-un à son compte.
/// Jamais supprimé: les enregistrements qui le référencent utilisent
/// des back-références nullables.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Doctor {
    pub id: DoctorId,
    pub account: AccountId,
    pub specialty: String,
    pub license_number: LicenseNumber,
    pub workplaces: BTreeSet<WorkplaceId>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

/// Le dossier d'un patient. La liste `assigned_doctors` est l'une des trois
/// relations qui rendent un patient visible pour un médecin.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Patient {
    pub unique_id: PatientId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub medical_history: Option<String>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub allergies: Option<String>,
    pub assigned_doctors: BTreeSet<DoctorId>,
}

impl Patient {
    /// Age révolu à la date du jour, si la date de naissance est connue
    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        let birth = self.date_of_birth?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age)
    }
}

/// Un code d'accès à usage unique contrôlant l'inscription des médecins.
/// Le passage `unused -> used` se fait exactement une fois, dans la même
/// unité atomique que la création du compte et du médecin.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistrationCode {
    pub code: Uuid,
    pub is_used: bool,
    pub email_associated: Option<String>,
    pub created_at: DateTime<Utc>,
    pub used_by: Option<DoctorId>,
}

impl RegistrationCode {
    pub fn new(email_associated: Option<String>) -> Self {
        Self {
            code: Uuid::new_v4(),
            is_used: false,
            email_associated,
            created_at: Utc::now(),
            used_by: None,
        }
    }
}

/// Statut d'un rendez-vous
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, StrumDisplay,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Pending
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient: PatientId,
    pub doctor: DoctorId,
    pub workplace: Option<WorkplaceId>,
    pub appointment_date: DateTime<Utc>,
    pub reason_for_appointment: String,
    pub status: AppointmentStatus,
}

/// Instantané immuable d'un rendez-vous supprimé. Créé uniquement par
/// l'étape d'archivage, jamais modifié ni supprimé ensuite. Les références
/// sont nullables: les enregistrements visés peuvent disparaître après coup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeletedAppointment {
    pub id: DeletedAppointmentId,
    pub patient: Option<PatientId>,
    pub doctor: Option<DoctorId>,
    pub workplace: Option<WorkplaceId>,
    pub appointment_date: DateTime<Utc>,
    pub reason_for_appointment: String,
    pub deleted_by: Option<AccountId>,
    pub deletion_reason: String,
    pub deletion_comment: Option<String>,
    pub deletion_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Consultation {
    pub id: ConsultationId,
    pub patient: PatientId,
    pub doctor: DoctorId,
    pub consultation_date: DateTime<Utc>,
    pub reason_for_consultation: String,
    pub medical_report: Option<String>,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub attachments: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sp2: Option<f64>,
    pub temperature: Option<f64>,
    pub blood_pressure: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MedicalProcedure {
    pub id: ProcedureId,
    pub patient: PatientId,
    pub procedure_type: String,
    pub procedure_date: NaiveDate,
    pub result: Option<String>,
    pub attachments: Option<String>,
    pub operator: Option<DoctorId>,
}

/// Un référencement d'un patient vers un confrère. Visible par le médecin
/// référent et le médecin référé uniquement (visibilité symétrique).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Referral {
    pub id: ReferralId,
    pub patient: PatientId,
    pub referred_to: DoctorId,
    pub referred_by: Option<DoctorId>,
    pub specialty_requested: String,
    pub reason_for_referral: String,
    pub attached_documents: Option<String>,
    pub date_of_referral: DateTime<Utc>,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Workplace {
    pub id: WorkplaceId,
    pub name: String,
    pub address: String,
    pub is_public: bool,
    pub creator: Option<DoctorId>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Note {
    pub id: NoteId,
    pub author: DoctorId,
    pub patient: Option<PatientId>,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForumPost {
    pub id: PostId,
    pub author: DoctorId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForumComment {
    pub id: CommentId,
    pub post: PostId,
    pub author: DoctorId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_private: bool,
}
