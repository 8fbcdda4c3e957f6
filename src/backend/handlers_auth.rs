//! Gestion des routes nécessitant un médecin authentifié.
//!
//! Chaque handler reçoit l'extracteur [`AuthDoctor`] et délègue la décision
//! d'accès au service; ici on ne fait que valider la forme des entrées et
//! traduire les résultats en JSON.

use std::path::Path as FilePath;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use http::StatusCode;
use log::warn;
use serde_json::json;
use uuid::Uuid;

use crate::backend::errors::ApiError;
use crate::backend::middlewares::AuthDoctor;
use crate::backend::models::{
    AppointmentDeleteRequest, AppointmentRequest, AppointmentUpdateRequest, ConsultationRequest,
    ConsultationUpdateRequest, DoctorProfile, ForumCommentFilter, ForumCommentRequest,
    ForumCommentUpdateRequest, ForumPostRequest, ForumPostUpdateRequest, NoteRequest,
    NoteUpdateRequest, PatientFilter, PatientRequest, PatientUpdateRequest, ProcedureRequest,
    ProcedureUpdateRequest, ProfileUpdateRequest, ReferralRequest, ReferralUpdateRequest,
    WorkplaceRequest, WorkplaceUpdateRequest,
};
use crate::backend::router::AppState;
use crate::consts;
use crate::models::{
    Appointment, AppointmentId, CommentId, Consultation, ConsultationId, DeletedAppointment,
    DoctorId, ForumComment, ForumPost, MedicalProcedure, Note, NoteId, Patient, PatientId, PostId,
    ProcedureId, Referral, ReferralId, Workplace, WorkplaceId,
};
use crate::services::{
    AppointmentUpdate, ConsultationUpdate, PatientUpdate, ProcedureUpdate, ProfileUpdate,
    ReferralUpdate, Service, WorkplaceUpdate,
};
use crate::tokens;
use crate::utils::file_input::FileInput;
use crate::utils::input_validation::{EmailInput, LicenseNumber, TextInput};

/// Validation d'un champ texte court obligatoire
fn short(field: &'static str, value: &str) -> Result<String, ApiError> {
    TextInput::new_short_form(value)
        .map(TextInput::into_inner)
        .map_err(|e| ApiError::Validation(field, e.to_string()))
}

/// Validation d'un champ texte long obligatoire
fn long(field: &'static str, value: &str) -> Result<String, ApiError> {
    TextInput::new_long_form(value)
        .map(TextInput::into_inner)
        .map_err(|e| ApiError::Validation(field, e.to_string()))
}

fn short_opt(field: &'static str, value: Option<String>) -> Result<Option<String>, ApiError> {
    value.as_deref().map(|v| short(field, v)).transpose()
}

fn long_opt(field: &'static str, value: Option<String>) -> Result<Option<String>, ApiError> {
    value.as_deref().map(|v| long(field, v)).transpose()
}

/// Validation et normalisation d'une adresse email optionnelle
fn email_opt(field: &'static str, value: Option<String>) -> Result<Option<String>, ApiError> {
    value
        .as_deref()
        .map(|v| {
            EmailInput::new(v)
                .map(|e| e.as_str().to_string())
                .map_err(|e| ApiError::Validation(field, e.to_string()))
        })
        .transpose()
}

/// Persiste la base après une mutation; un échec d'écriture ne doit pas
/// faire échouer la requête déjà appliquée en mémoire
fn persist(service: &Service) {
    if let Err(e) = service.save() {
        warn!("Échec de la sauvegarde de la base: {e}");
    }
}

// ------------------------------------------------------------------
// Session et profil
// ------------------------------------------------------------------

pub async fn logout(auth: AuthDoctor) -> StatusCode {
    tokens::revoke(&auth.token).await;
    StatusCode::NO_CONTENT
}

pub async fn get_profile(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<DoctorProfile>, ApiError> {
    let service = state.service.read().await;
    let doctor = service.get_doctor(auth.doctor)?;
    let account = service.get_account(doctor.account)?;
    Ok(Json(DoctorProfile::from_records(account, doctor)))
}

pub async fn update_profile(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ProfileUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let email = payload
        .email
        .as_deref()
        .map(EmailInput::new)
        .transpose()
        .map_err(|e| ApiError::Validation("email", e.to_string()))?;
    let license_number = payload
        .license_number
        .map(LicenseNumber::try_from)
        .transpose()
        .map_err(|e| ApiError::Validation("license_number", e.to_string()))?;

    let update = ProfileUpdate {
        first_name: short_opt("first_name", payload.first_name)?,
        last_name: short_opt("last_name", payload.last_name)?,
        email,
        specialty: short_opt("specialty", payload.specialty)?,
        license_number,
        workplaces: payload.workplaces,
        phone_number: short_opt("phone_number", payload.phone_number)?,
        address: short_opt("address", payload.address)?,
    };

    let mut service = state.service.write().await;
    service.update_profile(auth.doctor, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Médecins
// ------------------------------------------------------------------

pub async fn list_doctors(
    _auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<DoctorProfile>>, ApiError> {
    let service = state.service.read().await;
    let doctors = service
        .list_doctors()
        .filter_map(|d| {
            service
                .get_account(d.account)
                .ok()
                .map(|a| DoctorProfile::from_records(a, d))
        })
        .collect();
    Ok(Json(doctors))
}

pub async fn get_doctor(
    _auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<DoctorId>,
) -> Result<Json<DoctorProfile>, ApiError> {
    let service = state.service.read().await;
    let doctor = service.get_doctor(id)?;
    let account = service.get_account(doctor.account)?;
    Ok(Json(DoctorProfile::from_records(account, doctor)))
}

// ------------------------------------------------------------------
// Patients
// ------------------------------------------------------------------

pub async fn create_patient(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<PatientRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let patient = Patient {
        unique_id: PatientId::new(),
        first_name: short("first_name", &payload.first_name)?,
        last_name: short("last_name", &payload.last_name)?,
        date_of_birth: payload.date_of_birth,
        medical_history: long_opt("medical_history", payload.medical_history)?,
        blood_group: short_opt("blood_group", payload.blood_group)?,
        address: short_opt("address", payload.address)?,
        email: email_opt("email", payload.email)?,
        phone_number: short_opt("phone_number", payload.phone_number)?,
        emergency_contact_name: short_opt(
            "emergency_contact_name",
            payload.emergency_contact_name,
        )?,
        emergency_contact_number: short_opt(
            "emergency_contact_number",
            payload.emergency_contact_number,
        )?,
        allergies: long_opt("allergies", payload.allergies)?,
        assigned_doctors: Default::default(),
    };

    let mut service = state.service.write().await;
    let id = service.create_patient(auth.doctor, patient)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "unique_id": id }))))
}

pub async fn list_patients(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let service = state.service.read().await;
    let patients = service
        .list_patients(auth.doctor)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(patients))
}

pub async fn get_patient(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
) -> Result<Json<Patient>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_patient(auth.doctor, id)?.clone()))
}

/// Les patients du médecin connecté, avec filtre optionnel par identifiant
pub async fn my_patients(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Query(filter): Query<PatientFilter>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let service = state.service.read().await;
    match filter.id {
        Some(id) => Ok(Json(vec![service.get_patient(auth.doctor, id)?.clone()])),
        None => Ok(Json(
            service
                .list_patients(auth.doctor)
                .into_iter()
                .cloned()
                .collect(),
        )),
    }
}

pub async fn update_patient(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
    Json(payload): Json<PatientUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = PatientUpdate {
        first_name: short_opt("first_name", payload.first_name)?,
        last_name: short_opt("last_name", payload.last_name)?,
        date_of_birth: payload.date_of_birth,
        medical_history: long_opt("medical_history", payload.medical_history)?,
        blood_group: short_opt("blood_group", payload.blood_group)?,
        address: short_opt("address", payload.address)?,
        email: email_opt("email", payload.email)?,
        phone_number: short_opt("phone_number", payload.phone_number)?,
        emergency_contact_name: short_opt(
            "emergency_contact_name",
            payload.emergency_contact_name,
        )?,
        emergency_contact_number: short_opt(
            "emergency_contact_number",
            payload.emergency_contact_number,
        )?,
        allergies: long_opt("allergies", payload.allergies)?,
    };

    let mut service = state.service.write().await;
    service.update_patient(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Rendez-vous
// ------------------------------------------------------------------

pub async fn create_appointment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<AppointmentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let reason = long("reason_for_appointment", &payload.reason_for_appointment)?;

    let mut service = state.service.write().await;
    let id = service.create_appointment(
        auth.doctor,
        payload.patient,
        payload.workplace,
        payload.appointment_date,
        reason,
    )?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_appointments(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let service = state.service.read().await;
    let appointments = service
        .list_appointments(auth.doctor)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(appointments))
}

pub async fn get_appointment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<AppointmentId>,
) -> Result<Json<Appointment>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_appointment(auth.doctor, id)?.clone()))
}

pub async fn update_appointment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<AppointmentId>,
    Json(payload): Json<AppointmentUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = AppointmentUpdate {
        patient: payload.patient,
        workplace: payload.workplace.map(Some),
        appointment_date: payload.appointment_date,
        reason_for_appointment: long_opt(
            "reason_for_appointment",
            payload.reason_for_appointment,
        )?,
        status: payload.status,
    };

    let mut service = state.service.write().await;
    service.update_appointment(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

/// Suppression avec archivage; le corps JSON optionnel porte la raison
pub async fn delete_appointment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<AppointmentId>,
    payload: Option<Json<AppointmentDeleteRequest>>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload.unwrap_or_default();

    let mut service = state.service.write().await;
    service.delete_appointment(
        auth.doctor,
        auth.account,
        id,
        payload.reason,
        payload.comment,
    )?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_deleted_appointments(
    _auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<DeletedAppointment>>, ApiError> {
    let service = state.service.read().await;
    let snapshots = service
        .list_deleted_appointments()
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(snapshots))
}

// ------------------------------------------------------------------
// Consultations
// ------------------------------------------------------------------

pub async fn create_consultation(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ConsultationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let consultation = Consultation {
        id: ConsultationId::new(),
        patient: payload.patient,
        doctor: auth.doctor,
        consultation_date: chrono::Utc::now(),
        reason_for_consultation: long(
            "reason_for_consultation",
            &payload.reason_for_consultation,
        )?,
        medical_report: long_opt("medical_report", payload.medical_report)?,
        diagnosis: long_opt("diagnosis", payload.diagnosis)?,
        medications: long_opt("medications", payload.medications)?,
        attachments: None,
        weight: payload.weight,
        height: payload.height,
        sp2: payload.sp2,
        temperature: payload.temperature,
        blood_pressure: payload.blood_pressure,
    };

    let mut service = state.service.write().await;
    let id = service.create_consultation(auth.doctor, consultation)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_consultations(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Consultation>>, ApiError> {
    let service = state.service.read().await;
    let consultations = service
        .list_consultations(auth.doctor)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(consultations))
}

pub async fn get_consultation(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ConsultationId>,
) -> Result<Json<Consultation>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_consultation(auth.doctor, id)?.clone()))
}

pub async fn update_consultation(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ConsultationId>,
    Json(payload): Json<ConsultationUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = ConsultationUpdate {
        reason_for_consultation: long_opt(
            "reason_for_consultation",
            payload.reason_for_consultation,
        )?,
        medical_report: long_opt("medical_report", payload.medical_report)?,
        diagnosis: long_opt("diagnosis", payload.diagnosis)?,
        medications: long_opt("medications", payload.medications)?,
        weight: payload.weight,
        height: payload.height,
        sp2: payload.sp2,
        temperature: payload.temperature,
        blood_pressure: payload.blood_pressure,
    };

    let mut service = state.service.write().await;
    service.update_consultation(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_consultation(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ConsultationId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_consultation(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

/// Téléversement d'une pièce jointe (PDF ou image) pour une consultation
pub async fn upload_consultation_attachment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ConsultationId>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut file_content: Option<FileInput> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation("file", e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .ok_or_else(|| ApiError::Validation("file", "Nom de fichier manquant".to_string()))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation("file", e.to_string()))?;

        let validated = FileInput::new(&bytes, &filename)
            .map_err(|e| ApiError::Validation("file", e.to_string()))?;
        file_content = Some(validated);
    }

    let file = file_content
        .ok_or_else(|| ApiError::Validation("file", "Champ 'file' manquant".to_string()))?;

    // Nom unique pour éviter les collisions entre téléversements
    let uploads_dir = FilePath::new(consts::UPLOADS_DIR);
    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|_| ApiError::Internal)?;
    let unique_filename = format!("{}-{}", Uuid::new_v4(), file.filename());
    let file_path = uploads_dir.join(&unique_filename);
    tokio::fs::write(&file_path, file.content())
        .await
        .map_err(|_| ApiError::Internal)?;

    let reference = format!("{}/{}", consts::UPLOADS_DIR, unique_filename);
    let mut service = state.service.write().await;
    service.set_consultation_attachment(auth.doctor, id, reference.clone())?;
    persist(&service);

    Ok(Json(json!({ "attachments": reference })))
}

// ------------------------------------------------------------------
// Actes médicaux
// ------------------------------------------------------------------

pub async fn create_procedure(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ProcedureRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let procedure = MedicalProcedure {
        id: ProcedureId::new(),
        patient: payload.patient,
        procedure_type: short("procedure_type", &payload.procedure_type)?,
        procedure_date: payload.procedure_date,
        result: long_opt("result", payload.result)?,
        attachments: None,
        operator: None,
    };

    let mut service = state.service.write().await;
    let id = service.create_procedure(auth.doctor, procedure)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_procedures(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<MedicalProcedure>>, ApiError> {
    let service = state.service.read().await;
    let procedures = service
        .list_procedures(auth.doctor)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(procedures))
}

pub async fn get_procedure(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ProcedureId>,
) -> Result<Json<MedicalProcedure>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_procedure(auth.doctor, id)?.clone()))
}

pub async fn update_procedure(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ProcedureId>,
    Json(payload): Json<ProcedureUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = ProcedureUpdate {
        procedure_type: short_opt("procedure_type", payload.procedure_type)?,
        procedure_date: payload.procedure_date,
        result: long_opt("result", payload.result)?,
    };

    let mut service = state.service.write().await;
    service.update_procedure(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_procedure(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ProcedureId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_procedure(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Référencements
// ------------------------------------------------------------------

pub async fn create_referral(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ReferralRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let referral = Referral {
        id: ReferralId::new(),
        patient: payload.patient,
        referred_to: payload.referred_to,
        referred_by: None,
        specialty_requested: short("specialty_requested", &payload.specialty_requested)?,
        reason_for_referral: long("reason_for_referral", &payload.reason_for_referral)?,
        attached_documents: None,
        date_of_referral: chrono::Utc::now(),
        comments: long_opt("comments", payload.comments)?,
    };

    let mut service = state.service.write().await;
    let id = service.create_referral(auth.doctor, referral)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_referrals(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Referral>>, ApiError> {
    let service = state.service.read().await;
    let referrals = service
        .list_referrals(auth.doctor)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(referrals))
}

pub async fn get_referral(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ReferralId>,
) -> Result<Json<Referral>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_referral(auth.doctor, id)?.clone()))
}

pub async fn update_referral(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ReferralId>,
    Json(payload): Json<ReferralUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = ReferralUpdate {
        referred_to: payload.referred_to,
        specialty_requested: short_opt("specialty_requested", payload.specialty_requested)?,
        reason_for_referral: long_opt("reason_for_referral", payload.reason_for_referral)?,
        comments: long_opt("comments", payload.comments)?,
    };

    let mut service = state.service.write().await;
    service.update_referral(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_referral(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<ReferralId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_referral(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Cliniques
// ------------------------------------------------------------------

pub async fn create_workplace(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<WorkplaceRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let name = short("name", &payload.name)?;
    let address = short("address", &payload.address)?;

    let mut service = state.service.write().await;
    let id = service.create_workplace(auth.doctor, name, address, payload.is_public)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_workplaces(
    _auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Workplace>>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.list_workplaces().cloned().collect()))
}

pub async fn get_workplace(
    _auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<WorkplaceId>,
) -> Result<Json<Workplace>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_workplace(id)?.clone()))
}

pub async fn update_workplace(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<WorkplaceId>,
    Json(payload): Json<WorkplaceUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let update = WorkplaceUpdate {
        name: short_opt("name", payload.name)?,
        address: short_opt("address", payload.address)?,
        is_public: payload.is_public,
    };

    let mut service = state.service.write().await;
    service.update_workplace(auth.doctor, id, update)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_workplace(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<WorkplaceId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_workplace(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn workplace_statistics(
    _auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<WorkplaceId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.service.read().await;
    let stats = service.workplace_statistics(id)?;
    Ok(Json(serde_json::to_value(stats).map_err(|_| ApiError::Internal)?))
}

// ------------------------------------------------------------------
// Notes
// ------------------------------------------------------------------

pub async fn create_note(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<NoteRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let title = short_opt("title", payload.title)?;
    let content = long("content", &payload.content)?;

    let mut service = state.service.write().await;
    let id = service.create_note(auth.doctor, payload.patient, title, content)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_notes(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(
        service.list_notes(auth.doctor).into_iter().cloned().collect(),
    ))
}

pub async fn get_note(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<NoteId>,
) -> Result<Json<Note>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_note(auth.doctor, id)?.clone()))
}

pub async fn update_note(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<NoteId>,
    Json(payload): Json<NoteUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let title = short_opt("title", payload.title)?;
    let content = long_opt("content", payload.content)?;

    let mut service = state.service.write().await;
    service.update_note(auth.doctor, id, title, content)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_note(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<NoteId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_note(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Forum
// ------------------------------------------------------------------

pub async fn create_forum_post(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ForumPostRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let title = short("title", &payload.title)?;
    let content = long("content", &payload.content)?;

    let mut service = state.service.write().await;
    let id = service.create_forum_post(auth.doctor, title, content)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_forum_posts(
    _auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<Vec<ForumPost>>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(
        service.list_forum_posts().into_iter().cloned().collect(),
    ))
}

pub async fn get_forum_post(
    _auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<PostId>,
) -> Result<Json<ForumPost>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(service.get_forum_post(id)?.clone()))
}

pub async fn update_forum_post(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    Json(payload): Json<ForumPostUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let title = short_opt("title", payload.title)?;
    let content = long_opt("content", payload.content)?;

    let mut service = state.service.write().await;
    service.update_forum_post(auth.doctor, id, title, content)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_forum_post(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<PostId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_forum_post(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_forum_comment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Json(payload): Json<ForumCommentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let content = long("content", &payload.content)?;

    let mut service = state.service.write().await;
    let id =
        service.create_forum_comment(auth.doctor, payload.post, content, payload.is_private)?;
    persist(&service);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn list_forum_comments(
    _auth: AuthDoctor,
    State(state): State<AppState>,
    Query(filter): Query<ForumCommentFilter>,
) -> Result<Json<Vec<ForumComment>>, ApiError> {
    let service = state.service.read().await;
    Ok(Json(
        service
            .list_forum_comments(filter.post)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

pub async fn update_forum_comment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
    Json(payload): Json<ForumCommentUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let content = long_opt("content", payload.content)?;

    let mut service = state.service.write().await;
    service.update_forum_comment(auth.doctor, id, content)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_forum_comment(
    auth: AuthDoctor,
    State(state): State<AppState>,
    Path(id): Path<CommentId>,
) -> Result<StatusCode, ApiError> {
    let mut service = state.service.write().await;
    service.delete_forum_comment(auth.doctor, id)?;
    persist(&service);
    Ok(StatusCode::NO_CONTENT)
}

// ------------------------------------------------------------------
// Statistiques
// ------------------------------------------------------------------

pub async fn my_stats(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.service.read().await;
    let stats = service.doctor_stats(auth.doctor);
    Ok(Json(serde_json::to_value(stats).map_err(|_| ApiError::Internal)?))
}

pub async fn my_patient_stats(
    auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.service.read().await;
    let stats = service.doctor_patient_stats(auth.doctor);
    Ok(Json(serde_json::to_value(stats).map_err(|_| ApiError::Internal)?))
}

pub async fn global_stats(
    _auth: AuthDoctor,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = state.service.read().await;
    let stats = service.global_stats();
    Ok(Json(serde_json::to_value(stats).map_err(|_| ApiError::Internal)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_opt_rejects_invalid_address() {
        let result = email_opt("email", Some("pas-une-adresse".to_string()));
        let Err(ApiError::Validation(field, _)) = result else {
            panic!("Une adresse email invalide doit être rejetée avec le champ fautif");
        };
        assert_eq!(field, "email", "L'erreur doit porter sur le champ email");
    }

    #[test]
    fn test_email_opt_normalizes_valid_address() {
        let result = email_opt("email", Some("Patient@Example.COM".to_string()))
            .expect("Une adresse email valide doit être acceptée");
        assert_eq!(
            result.as_deref(),
            Some("patient@example.com"),
            "L'adresse email doit être normalisée en minuscules"
        );
    }

    #[test]
    fn test_email_opt_accepts_absent_value() {
        let result = email_opt("email", None).expect("Un champ absent ne doit pas être validé");
        assert!(result.is_none(), "Un champ absent doit rester absent");
    }

    #[test]
    fn test_short_opt_rejects_html_content() {
        let result = short_opt("blood_group", Some("<script>alert(1)</script>".to_string()));
        let Err(ApiError::Validation(field, _)) = result else {
            panic!("Un contenu HTML doit être rejeté par la validation de texte court");
        };
        assert_eq!(field, "blood_group", "L'erreur doit porter sur le champ fautif");
    }

    #[test]
    fn test_short_opt_accepts_plain_text() {
        let result = short_opt("phone_number", Some("+41 21 555 00 00".to_string()))
            .expect("Un texte court ordinaire doit être accepté");
        assert_eq!(result.as_deref(), Some("+41 21 555 00 00"));
    }
}
