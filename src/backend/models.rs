//! Définitions des structures pour les interactions avec l'API.
//! Contient les corps de requête désérialisés et les réponses qui ne se
//! confondent pas avec un enregistrement du modèle (le profil, notamment,
//! pour ne jamais sérialiser le hash du mot de passe).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Account, AppointmentStatus, Doctor, DoctorId, PatientId, PostId, WorkplaceId,
};

// --- Inscription et connexion ---

#[derive(Deserialize)]
pub struct RegisterDoctorRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub license_number: String,
    pub specialty: Option<String>,
    #[serde(default)]
    pub workplaces: Vec<WorkplaceId>,
    pub registration_code: Uuid,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Le profil renvoyé après connexion et sur /profile: la projection du
/// compte et du médecin, sans le mot de passe
#[derive(Serialize)]
pub struct DoctorProfile {
    pub id: DoctorId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
    pub license_number: String,
    pub workplaces: Vec<WorkplaceId>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

impl DoctorProfile {
    pub fn from_records(account: &Account, doctor: &Doctor) -> Self {
        Self {
            id: doctor.id,
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            specialty: doctor.specialty.clone(),
            license_number: doctor.license_number.as_ref().to_string(),
            workplaces: doctor.workplaces.iter().copied().collect(),
            phone_number: doctor.phone_number.clone(),
            address: doctor.address.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub workplaces: Option<Vec<WorkplaceId>>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

// --- Patients ---

#[derive(Deserialize)]
pub struct PatientRequest {
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
}

#[derive(Deserialize)]
pub struct PatientUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub medical_history: Option<String>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Deserialize)]
pub struct PatientFilter {
    pub id: Option<PatientId>,
}

// --- Rendez-vous ---

#[derive(Deserialize)]
pub struct AppointmentRequest {
    pub patient: PatientId,
    pub workplace: Option<WorkplaceId>,
    pub appointment_date: DateTime<Utc>,
    pub reason_for_appointment: String,
}

#[derive(Deserialize)]
pub struct AppointmentUpdateRequest {
    pub patient: Option<PatientId>,
    pub workplace: Option<WorkplaceId>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub reason_for_appointment: Option<String>,
    pub status: Option<AppointmentStatus>,
}

/// Corps optionnel du DELETE: la raison et le commentaire d'archivage
#[derive(Deserialize, Default)]
pub struct AppointmentDeleteRequest {
    pub reason: Option<String>,
    pub comment: Option<String>,
}

// --- Consultations ---

#[derive(Deserialize)]
pub struct ConsultationRequest {
    pub patient: PatientId,
    pub reason_for_consultation: String,
    pub medical_report: Option<String>,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sp2: Option<f64>,
    pub temperature: Option<f64>,
    pub blood_pressure: Option<String>,
}

#[derive(Deserialize)]
pub struct ConsultationUpdateRequest {
    pub reason_for_consultation: Option<String>,
    pub medical_report: Option<String>,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sp2: Option<f64>,
    pub temperature: Option<f64>,
    pub blood_pressure: Option<String>,
}

// --- Actes médicaux ---

#[derive(Deserialize)]
pub struct ProcedureRequest {
    pub patient: PatientId,
    pub procedure_type: String,
    pub procedure_date: NaiveDate,
    pub result: Option<String>,
}

#[derive(Deserialize)]
pub struct ProcedureUpdateRequest {
    pub procedure_type: Option<String>,
    pub procedure_date: Option<NaiveDate>,
    pub result: Option<String>,
}

// --- Référencements ---

#[derive(Deserialize)]
pub struct ReferralRequest {
    pub patient: PatientId,
    pub referred_to: DoctorId,
    pub specialty_requested: String,
    pub reason_for_referral: String,
    pub comments: Option<String>,
}

#[derive(Deserialize)]
pub struct ReferralUpdateRequest {
    pub referred_to: Option<DoctorId>,
    pub specialty_requested: Option<String>,
    pub reason_for_referral: Option<String>,
    pub comments: Option<String>,
}

// --- Cliniques ---

#[derive(Deserialize)]
pub struct WorkplaceRequest {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct WorkplaceUpdateRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub is_public: Option<bool>,
}

// --- Notes et forum ---

#[derive(Deserialize)]
pub struct NoteRequest {
    pub patient: Option<PatientId>,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Deserialize)]
pub struct NoteUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ForumPostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ForumPostUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ForumCommentRequest {
    pub post: PostId,
    pub content: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Deserialize)]
pub struct ForumCommentUpdateRequest {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ForumCommentFilter {
    pub post: Option<PostId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_delete_body_carries_reason_and_comment() {
        let body: AppointmentDeleteRequest =
            serde_json::from_str(r#"{"reason":"schedule_conflict","comment":"Reporté"}"#)
                .expect("le corps de suppression doit se désérialiser");

        assert_eq!(
            body.reason.as_deref(),
            Some("schedule_conflict"),
            "La raison envoyée par le client doit arriver jusqu'à l'archive"
        );
        assert_eq!(body.comment.as_deref(), Some("Reporté"));
    }

    #[test]
    fn test_appointment_delete_body_may_be_empty() {
        let body: AppointmentDeleteRequest =
            serde_json::from_str("{}").expect("un corps vide doit être accepté");
        assert!(body.reason.is_none());
        assert!(body.comment.is_none());
    }
}
