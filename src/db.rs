//! Stockage des données en mémoire, avec sauvegarde en JSON.
//!
//! Les contraintes d'unicité (email de compte, numéro de licence, nom de
//! clinique, code d'enregistrement) sont vérifiées ici, au plus près des
//! données.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, ErrorKind::NotFound},
    path::PathBuf,
};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, AccountId, Appointment, AppointmentId, CommentId, Consultation, ConsultationId,
    DeletedAppointment, Doctor, DoctorId, ForumComment, ForumPost, MedicalProcedure, Note, NoteId,
    Patient, PatientId, PostId, ProcedureId, Referral, ReferralId, RegistrationCode, Workplace,
    WorkplaceId,
};

#[derive(Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(skip)]
    path: Option<PathBuf>,
    accounts: HashMap<AccountId, Account>,
    doctors: HashMap<DoctorId, Doctor>,
    patients: HashMap<PatientId, Patient>,
    registration_codes: HashMap<Uuid, RegistrationCode>,
    appointments: HashMap<AppointmentId, Appointment>,
    deleted_appointments: Vec<DeletedAppointment>,
    consultations: HashMap<ConsultationId, Consultation>,
    procedures: HashMap<ProcedureId, MedicalProcedure>,
    referrals: HashMap<ReferralId, Referral>,
    workplaces: HashMap<WorkplaceId, Workplace>,
    notes: HashMap<NoteId, Note>,
    forum_posts: HashMap<PostId, ForumPost>,
    forum_comments: HashMap<CommentId, ForumComment>,
}

#[derive(Debug, Error)]
pub enum DBError {
    #[error("Enregistrement introuvable")]
    NotFound,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self, io::Error> {
        match File::open(&path) {
            Ok(f) => {
                let mut db: Self = serde_json::from_reader(f)?;
                db.path = Some(path);
                Ok(db)
            }

            // Fichier non existant, on le crée
            Err(not_found) if not_found.kind() == NotFound => {
                info!("DB file not found, creating new empty DB");
                let mut new_db = Database::default();
                new_db.path = Some(path);

                // On sauvegarde immédiatement pour détecter tôt un chemin invalide
                new_db.save()?;
                Ok(new_db)
            }

            Err(other) => Err(other),
        }
    }

    pub fn save(&self) -> Result<(), io::Error> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, self)?;
        }
        Ok(())
    }

    // --- Comptes ---

    pub fn get_account(&self, id: AccountId) -> Result<&Account, DBError> {
        self.accounts.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_account_mut(&mut self, id: AccountId) -> Result<&mut Account, DBError> {
        self.accounts.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn lookup_account_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.email == email)
    }

    pub fn store_account(&mut self, account: Account) {
        self.accounts.insert(account.id, account);
    }

    // --- Médecins ---

    pub fn get_doctor(&self, id: DoctorId) -> Result<&Doctor, DBError> {
        self.doctors.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_doctor_mut(&mut self, id: DoctorId) -> Result<&mut Doctor, DBError> {
        self.doctors.get_mut(&id).ok_or(DBError::NotFound)
    }

    /// Résolution principal -> médecin, le coeur du contrôle de rôle
    pub fn doctor_by_account(&self, account: AccountId) -> Option<&Doctor> {
        self.doctors.values().find(|d| d.account == account)
    }

    pub fn lookup_doctor_by_license(&self, license: &str) -> Option<&Doctor> {
        self.doctors
            .values()
            .find(|d| d.license_number.as_ref() == license)
    }

    pub fn store_doctor(&mut self, doctor: Doctor) {
        self.doctors.insert(doctor.id, doctor);
    }

    pub fn list_doctors(&self) -> impl Iterator<Item = &Doctor> + '_ {
        self.doctors.values()
    }

    // --- Patients ---

    pub fn get_patient(&self, id: PatientId) -> Result<&Patient, DBError> {
        self.patients.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_patient_mut(&mut self, id: PatientId) -> Result<&mut Patient, DBError> {
        self.patients.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_patient(&mut self, patient: Patient) {
        self.patients.insert(patient.unique_id, patient);
    }

    pub fn list_patients(&self) -> impl Iterator<Item = &Patient> + '_ {
        self.patients.values()
    }

    // --- Codes d'enregistrement ---

    pub fn get_registration_code(&self, code: Uuid) -> Option<&RegistrationCode> {
        self.registration_codes.get(&code)
    }

    pub fn get_registration_code_mut(&mut self, code: Uuid) -> Option<&mut RegistrationCode> {
        self.registration_codes.get_mut(&code)
    }

    pub fn store_registration_code(&mut self, code: RegistrationCode) {
        self.registration_codes.insert(code.code, code);
    }

    // --- Rendez-vous ---

    pub fn get_appointment(&self, id: AppointmentId) -> Result<&Appointment, DBError> {
        self.appointments.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_appointment_mut(&mut self, id: AppointmentId) -> Result<&mut Appointment, DBError> {
        self.appointments.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_appointment(&mut self, appointment: Appointment) {
        self.appointments.insert(appointment.id, appointment);
    }

    pub fn remove_appointment(&mut self, id: AppointmentId) -> Option<Appointment> {
        self.appointments.remove(&id)
    }

    pub fn list_appointments(&self) -> impl Iterator<Item = &Appointment> + '_ {
        self.appointments.values()
    }

    pub fn store_deleted_appointment(&mut self, snapshot: DeletedAppointment) {
        self.deleted_appointments.push(snapshot);
    }

    pub fn list_deleted_appointments(&self) -> impl Iterator<Item = &DeletedAppointment> + '_ {
        self.deleted_appointments.iter()
    }

    // --- Consultations ---

    pub fn get_consultation(&self, id: ConsultationId) -> Result<&Consultation, DBError> {
        self.consultations.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_consultation_mut(
        &mut self,
        id: ConsultationId,
    ) -> Result<&mut Consultation, DBError> {
        self.consultations.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_consultation(&mut self, consultation: Consultation) {
        self.consultations.insert(consultation.id, consultation);
    }

    pub fn remove_consultation(&mut self, id: ConsultationId) -> Option<Consultation> {
        self.consultations.remove(&id)
    }

    pub fn list_consultations(&self) -> impl Iterator<Item = &Consultation> + '_ {
        self.consultations.values()
    }

    // --- Actes médicaux ---

    pub fn get_procedure(&self, id: ProcedureId) -> Result<&MedicalProcedure, DBError> {
        self.procedures.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_procedure_mut(&mut self, id: ProcedureId) -> Result<&mut MedicalProcedure, DBError> {
        self.procedures.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_procedure(&mut self, procedure: MedicalProcedure) {
        self.procedures.insert(procedure.id, procedure);
    }

    pub fn remove_procedure(&mut self, id: ProcedureId) -> Option<MedicalProcedure> {
        self.procedures.remove(&id)
    }

    pub fn list_procedures(&self) -> impl Iterator<Item = &MedicalProcedure> + '_ {
        self.procedures.values()
    }

    // --- Référencements ---

    pub fn get_referral(&self, id: ReferralId) -> Result<&Referral, DBError> {
        self.referrals.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_referral_mut(&mut self, id: ReferralId) -> Result<&mut Referral, DBError> {
        self.referrals.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_referral(&mut self, referral: Referral) {
        self.referrals.insert(referral.id, referral);
    }

    pub fn remove_referral(&mut self, id: ReferralId) -> Option<Referral> {
        self.referrals.remove(&id)
    }

    pub fn list_referrals(&self) -> impl Iterator<Item = &Referral> + '_ {
        self.referrals.values()
    }

    // --- Cliniques ---

    pub fn get_workplace(&self, id: WorkplaceId) -> Result<&Workplace, DBError> {
        self.workplaces.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_workplace_mut(&mut self, id: WorkplaceId) -> Result<&mut Workplace, DBError> {
        self.workplaces.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn lookup_workplace_by_name(&self, name: &str) -> Option<&Workplace> {
        self.workplaces.values().find(|w| w.name == name)
    }

    pub fn store_workplace(&mut self, workplace: Workplace) {
        self.workplaces.insert(workplace.id, workplace);
    }

    pub fn remove_workplace(&mut self, id: WorkplaceId) -> Option<Workplace> {
        self.workplaces.remove(&id)
    }

    pub fn list_workplaces(&self) -> impl Iterator<Item = &Workplace> + '_ {
        self.workplaces.values()
    }

    // --- Notes ---

    pub fn get_note(&self, id: NoteId) -> Result<&Note, DBError> {
        self.notes.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_note_mut(&mut self, id: NoteId) -> Result<&mut Note, DBError> {
        self.notes.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_note(&mut self, note: Note) {
        self.notes.insert(note.id, note);
    }

    pub fn remove_note(&mut self, id: NoteId) -> Option<Note> {
        self.notes.remove(&id)
    }

    pub fn list_notes(&self) -> impl Iterator<Item = &Note> + '_ {
        self.notes.values()
    }

    // --- Forum ---

    pub fn get_forum_post(&self, id: PostId) -> Result<&ForumPost, DBError> {
        self.forum_posts.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_forum_post_mut(&mut self, id: PostId) -> Result<&mut ForumPost, DBError> {
        self.forum_posts.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_forum_post(&mut self, post: ForumPost) {
        self.forum_posts.insert(post.id, post);
    }

    pub fn remove_forum_post(&mut self, id: PostId) -> Option<ForumPost> {
        // Les commentaires du fil sont supprimés avec le post
        self.forum_comments.retain(|_, c| c.post != id);
        self.forum_posts.remove(&id)
    }

    pub fn list_forum_posts(&self) -> impl Iterator<Item = &ForumPost> + '_ {
        self.forum_posts.values()
    }

    pub fn get_forum_comment(&self, id: CommentId) -> Result<&ForumComment, DBError> {
        self.forum_comments.get(&id).ok_or(DBError::NotFound)
    }

    pub fn get_forum_comment_mut(&mut self, id: CommentId) -> Result<&mut ForumComment, DBError> {
        self.forum_comments.get_mut(&id).ok_or(DBError::NotFound)
    }

    pub fn store_forum_comment(&mut self, comment: ForumComment) {
        self.forum_comments.insert(comment.id, comment);
    }

    pub fn remove_forum_comment(&mut self, id: CommentId) -> Option<ForumComment> {
        self.forum_comments.remove(&id)
    }

    pub fn list_forum_comments(&self) -> impl Iterator<Item = &ForumComment> + '_ {
        self.forum_comments.values()
    }
}
