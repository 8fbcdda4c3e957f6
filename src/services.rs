//! API d'accès au dossier médical, et point d'entrée unique pour le
//! contrôle d'accès.
//!
//! Toutes les opérations protégées reçoivent le médecin agissant déjà résolu
//! par la porte d'identité ([`Service::doctor_for`]). Les lectures passent
//! par les ensembles de visibilité; une ressource hors périmètre est
//! indiscernable d'une ressource inexistante.

use std::collections::BTreeSet;

use chrono::Utc;
use log::info;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::authorization::{AccessDenied, Guard};
use crate::db::{DBError, Database};
use crate::models::{
    Account, AccountId, Appointment, AppointmentId, AppointmentStatus, CommentId, Consultation,
    ConsultationId, DeletedAppointment, DeletedAppointmentId, Doctor, DoctorId, ForumComment,
    ForumPost, MedicalProcedure, Note, NoteId, Patient, PatientId, PostId, ProcedureId, Referral,
    ReferralId, RegistrationCode, Workplace, WorkplaceId,
};
use crate::utils::input_validation::{password_validation, EmailInput, LicenseNumber};
use crate::utils::password_utils::{verify, PWHash};

/// Raison marqueur de la consultation créée avec chaque nouveau patient
pub const INITIAL_CONSULTATION_REASON: &str =
    "Consultation initiale (ajout du patient par le médecin)";

const DEFAULT_SPECIALTY: &str = "Généraliste";

pub struct Service {
    db: Database,
    guard: Guard,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error("Compte non reconnu comme un médecin.")]
    NotADoctor,

    #[error("Enregistrement introuvable")]
    NotFound,

    #[error("Code d'enregistrement invalide ou déjà utilisé.")]
    InvalidRegistrationCode,

    #[error("Ce code d'enregistrement n'est pas associé à cet email.")]
    CodeEmailMismatch,

    #[error("Un utilisateur avec cet email existe déjà.")]
    EmailTaken,

    #[error("Ce numéro de licence est déjà utilisé.")]
    LicenseTaken,

    #[error("Une clinique avec ce nom existe déjà.")]
    WorkplaceNameTaken,

    #[error("Le mot de passe est trop faible.")]
    WeakPassword,
}

impl From<DBError> for ServiceError {
    fn from(_: DBError) -> Self {
        // Hors périmètre et inexistant partagent la même forme d'erreur
        ServiceError::NotFound
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Identifiants invalides.")]
    InvalidCredentials,

    #[error("Compte non reconnu comme un médecin.")]
    NotADoctor,
}

/// Demande d'inscription d'un médecin, entrées déjà validées en forme
pub struct DoctorRegistration {
    pub email: EmailInput,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub license_number: LicenseNumber,
    pub specialty: Option<String>,
    pub workplaces: Vec<WorkplaceId>,
    pub registration_code: Uuid,
}

impl Service {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            guard: Guard,
        }
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        self.db.save()
    }

    // ------------------------------------------------------------------
    // Porte d'identité et de rôle
    // ------------------------------------------------------------------

    /// Résout un principal authentifié vers son profil médecin.
    /// Toute opération protégée commence par cette résolution.
    pub fn doctor_for(&self, account: AccountId) -> Result<DoctorId, ServiceError> {
        self.db
            .doctor_by_account(account)
            .map(|d| d.id)
            .ok_or(ServiceError::NotADoctor)
    }

    // ------------------------------------------------------------------
    // Registre des codes d'enregistrement et inscription
    // ------------------------------------------------------------------

    /// Émet un nouveau code d'accès, optionnellement lié à un email
    pub fn issue_registration_code(&mut self, email_associated: Option<String>) -> Uuid {
        let code = RegistrationCode::new(email_associated);
        let value = code.code;
        self.db.store_registration_code(code);
        info!("Code d'enregistrement émis: {value}");
        value
    }

    /// Inscrit un nouveau médecin.
    ///
    /// Toutes les vérifications précèdent la première écriture: si l'une
    /// échoue, le code reste inutilisé et aucune inscription partielle
    /// n'est observable. Sous le verrou d'écriture du serveur, deux
    /// rachats concurrents du même code ne peuvent pas gagner tous les
    /// deux: le second trouve le code consommé.
    pub fn register_doctor(
        &mut self,
        registration: DoctorRegistration,
    ) -> Result<DoctorId, ServiceError> {
        let DoctorRegistration {
            email,
            password,
            first_name,
            last_name,
            license_number,
            specialty,
            workplaces,
            registration_code,
        } = registration;

        if !password_validation(&password, email.as_str()) {
            return Err(ServiceError::WeakPassword);
        }

        // Rachat du code: absent et déjà utilisé sont indiscernables
        let code = self
            .db
            .get_registration_code(registration_code)
            .filter(|c| !c.is_used)
            .ok_or(ServiceError::InvalidRegistrationCode)?;

        if let Some(bound) = &code.email_associated {
            if bound != email.as_str() {
                return Err(ServiceError::CodeEmailMismatch);
            }
        }

        if self.db.lookup_account_by_email(email.as_str()).is_some() {
            return Err(ServiceError::EmailTaken);
        }

        if self
            .db
            .lookup_doctor_by_license(license_number.as_ref())
            .is_some()
        {
            return Err(ServiceError::LicenseTaken);
        }

        for workplace in &workplaces {
            self.db.get_workplace(*workplace)?;
        }

        // Toutes les vérifications ont passé: création du compte, du profil
        // médecin et consommation du code en un seul bloc
        let account = Account {
            id: AccountId::new(),
            email: email.as_str().to_string(),
            password: PWHash::new(&password),
            first_name,
            last_name,
        };
        let doctor = Doctor {
            id: DoctorId::new(),
            account: account.id,
            specialty: specialty.unwrap_or_else(|| DEFAULT_SPECIALTY.to_string()),
            license_number,
            workplaces: workplaces.into_iter().collect(),
            phone_number: None,
            address: None,
        };
        let doctor_id = doctor.id;

        self.db.store_account(account);
        self.db.store_doctor(doctor);

        if let Some(code) = self.db.get_registration_code_mut(registration_code) {
            code.is_used = true;
            code.used_by = Some(doctor_id);
        }

        info!("Compte médecin créé, code {registration_code} consommé");
        Ok(doctor_id)
    }

    /// Vérifie les identifiants et exige le rôle médecin
    pub fn login(&self, email: &str, password: &str) -> Result<(&Account, &Doctor), LoginError> {
        let account = self.db.lookup_account_by_email(email);
        let hash = account.map(|a| &a.password);
        if !verify(password, hash) {
            return Err(LoginError::InvalidCredentials);
        }

        let account = account.ok_or(LoginError::InvalidCredentials)?;
        let doctor = self
            .db
            .doctor_by_account(account.id)
            .ok_or(LoginError::NotADoctor)?;
        Ok((account, doctor))
    }

    pub fn get_account(&self, id: AccountId) -> Result<&Account, ServiceError> {
        Ok(self.db.get_account(id)?)
    }

    // ------------------------------------------------------------------
    // Périmètre de visibilité
    // ------------------------------------------------------------------

    /// L'ensemble des patients visibles pour un médecin: union dédupliquée
    /// des patients consultés par lui, de ceux qui le listent comme médecin
    /// assigné, et de ceux référés vers lui.
    pub fn visible_patients(&self, doctor: DoctorId) -> BTreeSet<PatientId> {
        let mut visible: BTreeSet<PatientId> = self
            .db
            .list_patients()
            .filter(|p| p.assigned_doctors.contains(&doctor))
            .map(|p| p.unique_id)
            .collect();

        visible.extend(
            self.db
                .list_consultations()
                .filter(|c| c.doctor == doctor)
                .map(|c| c.patient),
        );

        visible.extend(
            self.db
                .list_referrals()
                .filter(|r| r.referred_to == doctor)
                .map(|r| r.patient),
        );

        visible
    }

    fn patient_in_scope(&self, doctor: DoctorId, patient: PatientId) -> bool {
        let Ok(record) = self.db.get_patient(patient) else {
            return false;
        };

        record.assigned_doctors.contains(&doctor)
            || self
                .db
                .list_consultations()
                .any(|c| c.doctor == doctor && c.patient == patient)
            || self
                .db
                .list_referrals()
                .any(|r| r.referred_to == doctor && r.patient == patient)
    }

    /// Accès direct par identifiant, gardé par le même prédicat que les
    /// listes: hors périmètre renvoie la même erreur qu'un id inconnu
    fn scoped_patient(&self, doctor: DoctorId, patient: PatientId) -> Result<&Patient, ServiceError> {
        if !self.patient_in_scope(doctor, patient) {
            return Err(ServiceError::NotFound);
        }
        Ok(self.db.get_patient(patient)?)
    }

    // ------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------

    /// Crée un patient. Le médecin créateur entre immédiatement et
    /// durablement dans le périmètre par deux relations indépendantes:
    /// la consultation initiale et l'assignation.
    pub fn create_patient(
        &mut self,
        doctor: DoctorId,
        mut patient: Patient,
    ) -> Result<PatientId, ServiceError> {
        self.db.get_doctor(doctor)?;

        patient.unique_id = PatientId::new();
        patient.assigned_doctors.insert(doctor);
        let patient_id = patient.unique_id;

        let initial = Consultation {
            id: ConsultationId::new(),
            patient: patient_id,
            doctor,
            consultation_date: Utc::now(),
            reason_for_consultation: INITIAL_CONSULTATION_REASON.to_string(),
            medical_report: None,
            diagnosis: None,
            medications: None,
            attachments: None,
            weight: None,
            height: None,
            sp2: None,
            temperature: None,
            blood_pressure: None,
        };

        self.db.store_patient(patient);
        self.db.store_consultation(initial);
        Ok(patient_id)
    }

    pub fn list_patients(&self, doctor: DoctorId) -> Vec<&Patient> {
        self.visible_patients(doctor)
            .into_iter()
            .filter_map(|id| self.db.get_patient(id).ok())
            .collect()
    }

    pub fn get_patient(&self, doctor: DoctorId, id: PatientId) -> Result<&Patient, ServiceError> {
        self.scoped_patient(doctor, id)
    }

    /// Mise à jour par tout médecin ayant le patient dans son périmètre
    pub fn update_patient(
        &mut self,
        doctor: DoctorId,
        id: PatientId,
        update: PatientUpdate,
    ) -> Result<(), ServiceError> {
        self.scoped_patient(doctor, id)?;

        let patient = self.db.get_patient_mut(id)?;
        update.apply(patient);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Médecins et profil
    // ------------------------------------------------------------------

    pub fn list_doctors(&self) -> impl Iterator<Item = &Doctor> + '_ {
        self.db.list_doctors()
    }

    pub fn get_doctor(&self, id: DoctorId) -> Result<&Doctor, ServiceError> {
        Ok(self.db.get_doctor(id)?)
    }

    pub fn update_profile(
        &mut self,
        doctor: DoctorId,
        update: ProfileUpdate,
    ) -> Result<(), ServiceError> {
        let current = self.db.get_doctor(doctor)?;
        let account_id = current.account;

        if let Some(email) = &update.email {
            let taken = self
                .db
                .lookup_account_by_email(email.as_str())
                .is_some_and(|a| a.id != account_id);
            if taken {
                return Err(ServiceError::EmailTaken);
            }
        }

        if let Some(license) = &update.license_number {
            let taken = self
                .db
                .lookup_doctor_by_license(license.as_ref())
                .is_some_and(|d| d.id != doctor);
            if taken {
                return Err(ServiceError::LicenseTaken);
            }
        }

        if let Some(workplaces) = &update.workplaces {
            for workplace in workplaces {
                self.db.get_workplace(*workplace)?;
            }
        }

        let account = self.db.get_account_mut(account_id)?;
        if let Some(first_name) = update.first_name {
            account.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            account.last_name = last_name;
        }
        if let Some(email) = update.email {
            account.email = email.as_str().to_string();
        }

        let record = self.db.get_doctor_mut(doctor)?;
        if let Some(specialty) = update.specialty {
            record.specialty = specialty;
        }
        if let Some(license) = update.license_number {
            record.license_number = license;
        }
        if let Some(workplaces) = update.workplaces {
            record.workplaces = workplaces.into_iter().collect();
        }
        if let Some(phone_number) = update.phone_number {
            record.phone_number = Some(phone_number);
        }
        if let Some(address) = update.address {
            record.address = Some(address);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rendez-vous et archivage
    // ------------------------------------------------------------------

    pub fn create_appointment(
        &mut self,
        doctor: DoctorId,
        patient: PatientId,
        workplace: Option<WorkplaceId>,
        appointment_date: chrono::DateTime<Utc>,
        reason: String,
    ) -> Result<AppointmentId, ServiceError> {
        self.scoped_patient(doctor, patient)?;
        if let Some(workplace) = workplace {
            self.db.get_workplace(workplace)?;
        }

        let appointment = Appointment {
            id: AppointmentId::new(),
            patient,
            doctor,
            workplace,
            appointment_date,
            reason_for_appointment: reason,
            status: AppointmentStatus::Pending,
        };
        let id = appointment.id;
        self.db.store_appointment(appointment);
        Ok(id)
    }

    /// Les rendez-vous du médecin connecté uniquement
    pub fn list_appointments(&self, doctor: DoctorId) -> Vec<&Appointment> {
        let mut appointments: Vec<&Appointment> = self
            .db
            .list_appointments()
            .filter(|a| a.doctor == doctor)
            .collect();
        appointments.sort_by_key(|a| a.appointment_date);
        appointments
    }

    pub fn get_appointment(
        &self,
        doctor: DoctorId,
        id: AppointmentId,
    ) -> Result<&Appointment, ServiceError> {
        let appointment = self.db.get_appointment(id)?;
        if appointment.doctor != doctor {
            // Même forme d'erreur qu'un id inconnu
            return Err(ServiceError::NotFound);
        }
        Ok(appointment)
    }

    pub fn update_appointment(
        &mut self,
        doctor: DoctorId,
        id: AppointmentId,
        update: AppointmentUpdate,
    ) -> Result<(), ServiceError> {
        let appointment = self.get_appointment(doctor, id)?;
        self.guard.with_subject(doctor).mutate(appointment)?;

        if let Some(patient) = update.patient {
            self.scoped_patient(doctor, patient)?;
        }
        if let Some(Some(workplace)) = update.workplace {
            self.db.get_workplace(workplace)?;
        }

        let appointment = self.db.get_appointment_mut(id)?;
        update.apply(appointment);
        Ok(())
    }

    /// Supprime un rendez-vous en archivant d'abord un instantané immuable.
    /// Les deux écritures forment une seule unité: si l'archivage n'a pas
    /// lieu, la suppression n'a pas lieu non plus.
    pub fn delete_appointment(
        &mut self,
        doctor: DoctorId,
        deleted_by: AccountId,
        id: AppointmentId,
        reason: Option<String>,
        comment: Option<String>,
    ) -> Result<(), ServiceError> {
        let appointment = self.get_appointment(doctor, id)?;
        self.guard.with_subject(doctor).mutate(appointment)?;

        let snapshot = DeletedAppointment {
            id: DeletedAppointmentId::new(),
            patient: Some(appointment.patient),
            doctor: Some(appointment.doctor),
            workplace: appointment.workplace,
            appointment_date: appointment.appointment_date,
            reason_for_appointment: appointment.reason_for_appointment.clone(),
            deleted_by: Some(deleted_by),
            deletion_reason: reason.unwrap_or_else(|| "unknown".to_string()),
            deletion_comment: comment,
            deletion_date: Utc::now(),
        };

        self.db.store_deleted_appointment(snapshot);
        self.db.remove_appointment(id);
        info!("Rendez-vous {id} supprimé et archivé");
        Ok(())
    }

    /// Les archives, les plus récentes d'abord
    pub fn list_deleted_appointments(&self) -> Vec<&DeletedAppointment> {
        let mut snapshots: Vec<&DeletedAppointment> =
            self.db.list_deleted_appointments().collect();
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.deletion_date));
        snapshots
    }

    // ------------------------------------------------------------------
    // Consultations
    // ------------------------------------------------------------------

    pub fn create_consultation(
        &mut self,
        doctor: DoctorId,
        mut consultation: Consultation,
    ) -> Result<ConsultationId, ServiceError> {
        self.scoped_patient(doctor, consultation.patient)?;

        consultation.id = ConsultationId::new();
        consultation.doctor = doctor;
        consultation.consultation_date = Utc::now();
        let id = consultation.id;
        self.db.store_consultation(consultation);
        Ok(id)
    }

    pub fn list_consultations(&self, doctor: DoctorId) -> Vec<&Consultation> {
        let mut consultations: Vec<&Consultation> = self
            .db
            .list_consultations()
            .filter(|c| c.doctor == doctor)
            .collect();
        consultations.sort_by_key(|c| std::cmp::Reverse(c.consultation_date));
        consultations
    }

    pub fn get_consultation(
        &self,
        doctor: DoctorId,
        id: ConsultationId,
    ) -> Result<&Consultation, ServiceError> {
        let consultation = self.db.get_consultation(id)?;
        if consultation.doctor != doctor {
            return Err(ServiceError::NotFound);
        }
        Ok(consultation)
    }

    pub fn update_consultation(
        &mut self,
        doctor: DoctorId,
        id: ConsultationId,
        update: ConsultationUpdate,
    ) -> Result<(), ServiceError> {
        let consultation = self.get_consultation(doctor, id)?;
        self.guard.with_subject(doctor).mutate(consultation)?;

        let consultation = self.db.get_consultation_mut(id)?;
        update.apply(consultation);
        Ok(())
    }

    pub fn delete_consultation(
        &mut self,
        doctor: DoctorId,
        id: ConsultationId,
    ) -> Result<(), ServiceError> {
        let consultation = self.get_consultation(doctor, id)?;
        self.guard.with_subject(doctor).mutate(consultation)?;
        self.db.remove_consultation(id);
        Ok(())
    }

    /// Attache une référence de pièce jointe à une consultation
    pub fn set_consultation_attachment(
        &mut self,
        doctor: DoctorId,
        id: ConsultationId,
        reference: String,
    ) -> Result<(), ServiceError> {
        let consultation = self.get_consultation(doctor, id)?;
        self.guard.with_subject(doctor).mutate(consultation)?;
        self.db.get_consultation_mut(id)?.attachments = Some(reference);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Actes médicaux
    // ------------------------------------------------------------------

    pub fn create_procedure(
        &mut self,
        doctor: DoctorId,
        mut procedure: MedicalProcedure,
    ) -> Result<ProcedureId, ServiceError> {
        self.scoped_patient(doctor, procedure.patient)?;

        procedure.id = ProcedureId::new();
        procedure.operator = Some(doctor);
        let id = procedure.id;
        self.db.store_procedure(procedure);
        Ok(id)
    }

    pub fn list_procedures(&self, doctor: DoctorId) -> Vec<&MedicalProcedure> {
        let mut procedures: Vec<&MedicalProcedure> = self
            .db
            .list_procedures()
            .filter(|p| p.operator == Some(doctor))
            .collect();
        procedures.sort_by_key(|p| p.procedure_date);
        procedures
    }

    pub fn get_procedure(
        &self,
        doctor: DoctorId,
        id: ProcedureId,
    ) -> Result<&MedicalProcedure, ServiceError> {
        let procedure = self.db.get_procedure(id)?;
        if procedure.operator != Some(doctor) {
            return Err(ServiceError::NotFound);
        }
        Ok(procedure)
    }

    pub fn update_procedure(
        &mut self,
        doctor: DoctorId,
        id: ProcedureId,
        update: ProcedureUpdate,
    ) -> Result<(), ServiceError> {
        let procedure = self.get_procedure(doctor, id)?;
        self.guard.with_subject(doctor).mutate(procedure)?;

        let procedure = self.db.get_procedure_mut(id)?;
        update.apply(procedure);
        Ok(())
    }

    pub fn delete_procedure(&mut self, doctor: DoctorId, id: ProcedureId) -> Result<(), ServiceError> {
        let procedure = self.get_procedure(doctor, id)?;
        self.guard.with_subject(doctor).mutate(procedure)?;
        self.db.remove_procedure(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Référencements
    // ------------------------------------------------------------------

    pub fn create_referral(
        &mut self,
        doctor: DoctorId,
        mut referral: Referral,
    ) -> Result<ReferralId, ServiceError> {
        self.scoped_patient(doctor, referral.patient)?;
        self.db.get_doctor(referral.referred_to)?;

        referral.id = ReferralId::new();
        referral.referred_by = Some(doctor);
        referral.date_of_referral = Utc::now();
        let id = referral.id;
        self.db.store_referral(referral);
        Ok(id)
    }

    /// Visibilité symétrique: référent ou référé
    pub fn list_referrals(&self, doctor: DoctorId) -> Vec<&Referral> {
        let mut referrals: Vec<&Referral> = self
            .db
            .list_referrals()
            .filter(|r| r.referred_by == Some(doctor) || r.referred_to == doctor)
            .collect();
        referrals.sort_by_key(|r| std::cmp::Reverse(r.date_of_referral));
        referrals
    }

    pub fn get_referral(&self, doctor: DoctorId, id: ReferralId) -> Result<&Referral, ServiceError> {
        let referral = self.db.get_referral(id)?;
        if referral.referred_by != Some(doctor) && referral.referred_to != doctor {
            return Err(ServiceError::NotFound);
        }
        Ok(referral)
    }

    /// Les deux parties peuvent modifier le référencement
    pub fn update_referral(
        &mut self,
        doctor: DoctorId,
        id: ReferralId,
        update: ReferralUpdate,
    ) -> Result<(), ServiceError> {
        let referral = self.get_referral(doctor, id)?;
        self.guard.with_subject(doctor).mutate(referral)?;

        if let Some(referred_to) = update.referred_to {
            self.db.get_doctor(referred_to)?;
        }

        let referral = self.db.get_referral_mut(id)?;
        update.apply(referral);
        Ok(())
    }

    pub fn delete_referral(&mut self, doctor: DoctorId, id: ReferralId) -> Result<(), ServiceError> {
        let referral = self.get_referral(doctor, id)?;
        self.guard.with_subject(doctor).mutate(referral)?;
        self.db.remove_referral(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cliniques
    // ------------------------------------------------------------------

    pub fn create_workplace(
        &mut self,
        doctor: DoctorId,
        name: String,
        address: String,
        is_public: bool,
    ) -> Result<WorkplaceId, ServiceError> {
        self.db.get_doctor(doctor)?;
        if self.db.lookup_workplace_by_name(&name).is_some() {
            return Err(ServiceError::WorkplaceNameTaken);
        }

        let workplace = Workplace {
            id: WorkplaceId::new(),
            name,
            address,
            is_public,
            creator: Some(doctor),
        };
        let id = workplace.id;
        self.db.store_workplace(workplace);
        Ok(id)
    }

    pub fn list_workplaces(&self) -> impl Iterator<Item = &Workplace> + '_ {
        self.db.list_workplaces()
    }

    pub fn get_workplace(&self, id: WorkplaceId) -> Result<&Workplace, ServiceError> {
        Ok(self.db.get_workplace(id)?)
    }

    /// Modification réservée au créateur
    pub fn update_workplace(
        &mut self,
        doctor: DoctorId,
        id: WorkplaceId,
        update: WorkplaceUpdate,
    ) -> Result<(), ServiceError> {
        let workplace = self.db.get_workplace(id)?;
        self.guard.with_subject(doctor).mutate(workplace)?;

        if let Some(name) = &update.name {
            let taken = self
                .db
                .lookup_workplace_by_name(name)
                .is_some_and(|w| w.id != id);
            if taken {
                return Err(ServiceError::WorkplaceNameTaken);
            }
        }

        let workplace = self.db.get_workplace_mut(id)?;
        update.apply(workplace);
        Ok(())
    }

    pub fn delete_workplace(&mut self, doctor: DoctorId, id: WorkplaceId) -> Result<(), ServiceError> {
        let workplace = self.db.get_workplace(id)?;
        self.guard.with_subject(doctor).mutate(workplace)?;

        self.db.remove_workplace(id);
        self.nullify_workplace_references(id);
        Ok(())
    }

    /// Équivalent du SET NULL relationnel à la suppression d'une clinique
    fn nullify_workplace_references(&mut self, id: WorkplaceId) {
        let appointments: Vec<AppointmentId> = self
            .db
            .list_appointments()
            .filter(|a| a.workplace == Some(id))
            .map(|a| a.id)
            .collect();
        for appointment in appointments {
            if let Ok(a) = self.db.get_appointment_mut(appointment) {
                a.workplace = None;
            }
        }

        let doctors: Vec<DoctorId> = self.db.list_doctors().map(|d| d.id).collect();
        for doctor in doctors {
            if let Ok(d) = self.db.get_doctor_mut(doctor) {
                d.workplaces.remove(&id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    pub fn create_note(
        &mut self,
        doctor: DoctorId,
        patient: Option<PatientId>,
        title: Option<String>,
        content: String,
    ) -> Result<NoteId, ServiceError> {
        self.db.get_doctor(doctor)?;
        if let Some(patient) = patient {
            self.scoped_patient(doctor, patient)?;
        }

        let note = Note {
            id: NoteId::new(),
            author: doctor,
            patient,
            title: title.unwrap_or_else(|| "Sans titre".to_string()),
            content,
            created_at: Utc::now(),
        };
        let id = note.id;
        self.db.store_note(note);
        Ok(id)
    }

    pub fn list_notes(&self, doctor: DoctorId) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self
            .db
            .list_notes()
            .filter(|n| n.author == doctor)
            .collect();
        notes.sort_by_key(|n| std::cmp::Reverse(n.created_at));
        notes
    }

    pub fn get_note(&self, doctor: DoctorId, id: NoteId) -> Result<&Note, ServiceError> {
        let note = self.db.get_note(id)?;
        if note.author != doctor {
            return Err(ServiceError::NotFound);
        }
        Ok(note)
    }

    pub fn update_note(
        &mut self,
        doctor: DoctorId,
        id: NoteId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<(), ServiceError> {
        let note = self.get_note(doctor, id)?;
        self.guard.with_subject(doctor).mutate(note)?;

        let note = self.db.get_note_mut(id)?;
        if let Some(title) = title {
            note.title = title;
        }
        if let Some(content) = content {
            note.content = content;
        }
        Ok(())
    }

    pub fn delete_note(&mut self, doctor: DoctorId, id: NoteId) -> Result<(), ServiceError> {
        let note = self.get_note(doctor, id)?;
        self.guard.with_subject(doctor).mutate(note)?;
        self.db.remove_note(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Forum
    // ------------------------------------------------------------------

    pub fn create_forum_post(
        &mut self,
        doctor: DoctorId,
        title: String,
        content: String,
    ) -> Result<PostId, ServiceError> {
        self.db.get_doctor(doctor)?;

        let post = ForumPost {
            id: PostId::new(),
            author: doctor,
            title,
            content,
            created_at: Utc::now(),
        };
        let id = post.id;
        self.db.store_forum_post(post);
        Ok(id)
    }

    pub fn list_forum_posts(&self) -> Vec<&ForumPost> {
        let mut posts: Vec<&ForumPost> = self.db.list_forum_posts().collect();
        posts.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        posts
    }

    pub fn get_forum_post(&self, id: PostId) -> Result<&ForumPost, ServiceError> {
        Ok(self.db.get_forum_post(id)?)
    }

    pub fn update_forum_post(
        &mut self,
        doctor: DoctorId,
        id: PostId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<(), ServiceError> {
        let post = self.db.get_forum_post(id)?;
        self.guard.with_subject(doctor).mutate(post)?;

        let post = self.db.get_forum_post_mut(id)?;
        if let Some(title) = title {
            post.title = title;
        }
        if let Some(content) = content {
            post.content = content;
        }
        Ok(())
    }

    pub fn delete_forum_post(&mut self, doctor: DoctorId, id: PostId) -> Result<(), ServiceError> {
        let post = self.db.get_forum_post(id)?;
        self.guard.with_subject(doctor).mutate(post)?;
        self.db.remove_forum_post(id);
        Ok(())
    }

    pub fn create_forum_comment(
        &mut self,
        doctor: DoctorId,
        post: PostId,
        content: String,
        is_private: bool,
    ) -> Result<CommentId, ServiceError> {
        self.db.get_doctor(doctor)?;
        self.db.get_forum_post(post)?;

        let comment = ForumComment {
            id: CommentId::new(),
            post,
            author: doctor,
            content,
            created_at: Utc::now(),
            is_private,
        };
        let id = comment.id;
        self.db.store_forum_comment(comment);
        Ok(id)
    }

    pub fn list_forum_comments(&self, post: Option<PostId>) -> Vec<&ForumComment> {
        let mut comments: Vec<&ForumComment> = self
            .db
            .list_forum_comments()
            .filter(|c| post.map_or(true, |p| c.post == p))
            .collect();
        comments.sort_by_key(|c| c.created_at);
        comments
    }

    pub fn update_forum_comment(
        &mut self,
        doctor: DoctorId,
        id: CommentId,
        content: Option<String>,
    ) -> Result<(), ServiceError> {
        let comment = self.db.get_forum_comment(id)?;
        self.guard.with_subject(doctor).mutate(comment)?;

        if let Some(content) = content {
            self.db.get_forum_comment_mut(id)?.content = content;
        }
        Ok(())
    }

    pub fn delete_forum_comment(&mut self, doctor: DoctorId, id: CommentId) -> Result<(), ServiceError> {
        let comment = self.db.get_forum_comment(id)?;
        self.guard.with_subject(doctor).mutate(comment)?;
        self.db.remove_forum_comment(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statistiques (recalculées à chaque appel, aucune mise en cache)
    // ------------------------------------------------------------------

    pub fn doctor_stats(&self, doctor: DoctorId) -> DoctorStats {
        DoctorStats {
            total_patients: self
                .db
                .list_patients()
                .filter(|p| p.assigned_doctors.contains(&doctor))
                .count(),
            total_consultations: self
                .db
                .list_consultations()
                .filter(|c| c.doctor == doctor)
                .count(),
            total_medical_procedures: self
                .db
                .list_procedures()
                .filter(|p| p.operator == Some(doctor))
                .count(),
        }
    }

    /// Détail par patient assigné: activité de ce médecin uniquement
    pub fn doctor_patient_stats(&self, doctor: DoctorId) -> Vec<PatientActivity> {
        self.db
            .list_patients()
            .filter(|p| p.assigned_doctors.contains(&doctor))
            .map(|patient| PatientActivity {
                unique_id: patient.unique_id,
                full_name: format!("{} {}", patient.first_name, patient.last_name),
                consultations_count: self
                    .db
                    .list_consultations()
                    .filter(|c| c.patient == patient.unique_id && c.doctor == doctor)
                    .count(),
                medical_procedures_count: self
                    .db
                    .list_procedures()
                    .filter(|p| p.patient == patient.unique_id && p.operator == Some(doctor))
                    .count(),
                referrals_count: self
                    .db
                    .list_referrals()
                    .filter(|r| r.patient == patient.unique_id && r.referred_by == Some(doctor))
                    .count(),
            })
            .collect()
    }

    /// Statistiques d'une clinique: patients distincts atteints par les
    /// médecins de la clinique, totaux, et détail par médecin
    pub fn workplace_statistics(&self, id: WorkplaceId) -> Result<WorkplaceStatistics, ServiceError> {
        let workplace = self.db.get_workplace(id)?;

        let clinic_doctors: Vec<&Doctor> = self
            .db
            .list_doctors()
            .filter(|d| d.workplaces.contains(&workplace.id))
            .collect();
        let doctor_ids: BTreeSet<DoctorId> = clinic_doctors.iter().map(|d| d.id).collect();

        let mut patients: BTreeSet<PatientId> = self
            .db
            .list_appointments()
            .filter(|a| a.workplace == Some(id))
            .map(|a| a.patient)
            .collect();
        patients.extend(
            self.db
                .list_consultations()
                .filter(|c| doctor_ids.contains(&c.doctor))
                .map(|c| c.patient),
        );
        patients.extend(
            self.db
                .list_procedures()
                .filter(|p| p.operator.is_some_and(|o| doctor_ids.contains(&o)))
                .map(|p| p.patient),
        );

        let doctors_breakdown = clinic_doctors
            .iter()
            .map(|doctor| DoctorBreakdown {
                id: doctor.id,
                name: self.doctor_display_name(doctor),
                consultations: self
                    .db
                    .list_consultations()
                    .filter(|c| c.doctor == doctor.id)
                    .count(),
                appointments: self
                    .db
                    .list_appointments()
                    .filter(|a| a.doctor == doctor.id)
                    .count(),
                medical_procedures: self
                    .db
                    .list_procedures()
                    .filter(|p| p.operator == Some(doctor.id))
                    .count(),
            })
            .collect();

        Ok(WorkplaceStatistics {
            total_stats: WorkplaceTotals {
                doctors: doctor_ids.len(),
                patients: patients.len(),
                appointments: self
                    .db
                    .list_appointments()
                    .filter(|a| a.workplace == Some(id))
                    .count(),
                consultations: self
                    .db
                    .list_consultations()
                    .filter(|c| doctor_ids.contains(&c.doctor))
                    .count(),
                medical_procedures: self
                    .db
                    .list_procedures()
                    .filter(|p| p.operator.is_some_and(|o| doctor_ids.contains(&o)))
                    .count(),
            },
            doctors_breakdown,
        })
    }

    /// Totaux non périmétrés, plus agrégats par clinique et par médecin
    pub fn global_stats(&self) -> GlobalStats {
        let mut stats_by_workplace: Vec<WorkplaceRollup> = self
            .db
            .list_workplaces()
            .map(|workplace| {
                let doctor_ids: BTreeSet<DoctorId> = self
                    .db
                    .list_doctors()
                    .filter(|d| d.workplaces.contains(&workplace.id))
                    .map(|d| d.id)
                    .collect();

                let patients: BTreeSet<PatientId> = self
                    .db
                    .list_patients()
                    .filter(|p| p.assigned_doctors.iter().any(|d| doctor_ids.contains(d)))
                    .map(|p| p.unique_id)
                    .collect();

                WorkplaceRollup {
                    id: workplace.id,
                    name: workplace.name.clone(),
                    consultation_count: self
                        .db
                        .list_consultations()
                        .filter(|c| doctor_ids.contains(&c.doctor))
                        .count(),
                    patient_count: patients.len(),
                    procedure_count: self
                        .db
                        .list_procedures()
                        .filter(|p| p.operator.is_some_and(|o| doctor_ids.contains(&o)))
                        .count(),
                }
            })
            .collect();
        stats_by_workplace.sort_by(|a, b| a.name.cmp(&b.name));

        let mut stats_by_doctor: Vec<DoctorRollup> = self
            .db
            .list_doctors()
            .map(|doctor| DoctorRollup {
                id: doctor.id,
                full_name: self.doctor_display_name(doctor),
                specialty: doctor.specialty.clone(),
                consultation_count: self
                    .db
                    .list_consultations()
                    .filter(|c| c.doctor == doctor.id)
                    .count(),
                patient_count: self
                    .db
                    .list_patients()
                    .filter(|p| p.assigned_doctors.contains(&doctor.id))
                    .count(),
                referral_count: self
                    .db
                    .list_referrals()
                    .filter(|r| r.referred_by == Some(doctor.id))
                    .count(),
                procedure_count: self
                    .db
                    .list_procedures()
                    .filter(|p| p.operator == Some(doctor.id))
                    .count(),
            })
            .collect();
        stats_by_doctor.sort_by(|a, b| a.full_name.cmp(&b.full_name));

        GlobalStats {
            total_doctors: self.db.list_doctors().count(),
            total_workplaces: self.db.list_workplaces().count(),
            total_patients: self.db.list_patients().count(),
            total_consultations: self.db.list_consultations().count(),
            total_referrals: self.db.list_referrals().count(),
            total_procedures: self.db.list_procedures().count(),
            stats_by_workplace,
            stats_by_doctor,
        }
    }

    fn doctor_display_name(&self, doctor: &Doctor) -> String {
        match self.db.get_account(doctor.account) {
            Ok(account) => format!("Dr. {} {}", account.first_name, account.last_name),
            Err(_) => "Dr. ?".to_string(),
        }
    }
}

// ----------------------------------------------------------------------
// Mises à jour partielles
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub medical_history: Option<String>,
    pub blood_group: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub allergies: Option<String>,
}

impl PatientUpdate {
    fn apply(self, patient: &mut Patient) {
        if let Some(v) = self.first_name {
            patient.first_name = v;
        }
        if let Some(v) = self.last_name {
            patient.last_name = v;
        }
        if let Some(v) = self.date_of_birth {
            patient.date_of_birth = Some(v);
        }
        if let Some(v) = self.medical_history {
            patient.medical_history = Some(v);
        }
        if let Some(v) = self.blood_group {
            patient.blood_group = Some(v);
        }
        if let Some(v) = self.address {
            patient.address = Some(v);
        }
        if let Some(v) = self.email {
            patient.email = Some(v);
        }
        if let Some(v) = self.phone_number {
            patient.phone_number = Some(v);
        }
        if let Some(v) = self.emergency_contact_name {
            patient.emergency_contact_name = Some(v);
        }
        if let Some(v) = self.emergency_contact_number {
            patient.emergency_contact_number = Some(v);
        }
        if let Some(v) = self.allergies {
            patient.allergies = Some(v);
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<EmailInput>,
    pub specialty: Option<String>,
    pub license_number: Option<LicenseNumber>,
    pub workplaces: Option<Vec<WorkplaceId>>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default)]
pub struct AppointmentUpdate {
    pub patient: Option<PatientId>,
    // Some(None) détache la clinique, None la laisse en place
    pub workplace: Option<Option<WorkplaceId>>,
    pub appointment_date: Option<chrono::DateTime<Utc>>,
    pub reason_for_appointment: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentUpdate {
    fn apply(self, appointment: &mut Appointment) {
        if let Some(v) = self.patient {
            appointment.patient = v;
        }
        if let Some(v) = self.workplace {
            appointment.workplace = v;
        }
        if let Some(v) = self.appointment_date {
            appointment.appointment_date = v;
        }
        if let Some(v) = self.reason_for_appointment {
            appointment.reason_for_appointment = v;
        }
        if let Some(v) = self.status {
            appointment.status = v;
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsultationUpdate {
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

impl ConsultationUpdate {
    fn apply(self, consultation: &mut Consultation) {
        if let Some(v) = self.reason_for_consultation {
            consultation.reason_for_consultation = v;
        }
        if let Some(v) = self.medical_report {
            consultation.medical_report = Some(v);
        }
        if let Some(v) = self.diagnosis {
            consultation.diagnosis = Some(v);
        }
        if let Some(v) = self.medications {
            consultation.medications = Some(v);
        }
        if let Some(v) = self.weight {
            consultation.weight = Some(v);
        }
        if let Some(v) = self.height {
            consultation.height = Some(v);
        }
        if let Some(v) = self.sp2 {
            consultation.sp2 = Some(v);
        }
        if let Some(v) = self.temperature {
            consultation.temperature = Some(v);
        }
        if let Some(v) = self.blood_pressure {
            consultation.blood_pressure = Some(v);
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcedureUpdate {
    pub procedure_type: Option<String>,
    pub procedure_date: Option<chrono::NaiveDate>,
    pub result: Option<String>,
}

impl ProcedureUpdate {
    fn apply(self, procedure: &mut MedicalProcedure) {
        if let Some(v) = self.procedure_type {
            procedure.procedure_type = v;
        }
        if let Some(v) = self.procedure_date {
            procedure.procedure_date = v;
        }
        if let Some(v) = self.result {
            procedure.result = Some(v);
        }
    }
}

#[derive(Debug, Default)]
pub struct ReferralUpdate {
    pub referred_to: Option<DoctorId>,
    pub specialty_requested: Option<String>,
    pub reason_for_referral: Option<String>,
    pub comments: Option<String>,
}

impl ReferralUpdate {
    fn apply(self, referral: &mut Referral) {
        if let Some(v) = self.referred_to {
            referral.referred_to = v;
        }
        if let Some(v) = self.specialty_requested {
            referral.specialty_requested = v;
        }
        if let Some(v) = self.reason_for_referral {
            referral.reason_for_referral = v;
        }
        if let Some(v) = self.comments {
            referral.comments = Some(v);
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkplaceUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub is_public: Option<bool>,
}

impl WorkplaceUpdate {
    fn apply(self, workplace: &mut Workplace) {
        if let Some(v) = self.name {
            workplace.name = v;
        }
        if let Some(v) = self.address {
            workplace.address = v;
        }
        if let Some(v) = self.is_public {
            workplace.is_public = v;
        }
    }
}

// ----------------------------------------------------------------------
// Agrégats
// ----------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DoctorStats {
    pub total_patients: usize,
    pub total_consultations: usize,
    pub total_medical_procedures: usize,
}

#[derive(Debug, Serialize)]
pub struct PatientActivity {
    pub unique_id: PatientId,
    pub full_name: String,
    pub consultations_count: usize,
    pub medical_procedures_count: usize,
    pub referrals_count: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkplaceTotals {
    pub doctors: usize,
    pub patients: usize,
    pub appointments: usize,
    pub consultations: usize,
    pub medical_procedures: usize,
}

#[derive(Debug, Serialize)]
pub struct DoctorBreakdown {
    pub id: DoctorId,
    pub name: String,
    pub consultations: usize,
    pub appointments: usize,
    pub medical_procedures: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkplaceStatistics {
    pub total_stats: WorkplaceTotals,
    pub doctors_breakdown: Vec<DoctorBreakdown>,
}

#[derive(Debug, Serialize)]
pub struct WorkplaceRollup {
    pub id: WorkplaceId,
    pub name: String,
    pub consultation_count: usize,
    pub patient_count: usize,
    pub procedure_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DoctorRollup {
    pub id: DoctorId,
    pub full_name: String,
    pub specialty: String,
    pub consultation_count: usize,
    pub patient_count: usize,
    pub referral_count: usize,
    pub procedure_count: usize,
}

#[derive(Debug, Serialize)]
pub struct GlobalStats {
    pub total_doctors: usize,
    pub total_workplaces: usize,
    pub total_patients: usize,
    pub total_consultations: usize,
    pub total_referrals: usize,
    pub total_procedures: usize,
    pub stats_by_workplace: Vec<WorkplaceRollup>,
    pub stats_by_doctor: Vec<DoctorRollup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PASSWORD: &str = "correct horse battery staple";

    fn create_test_service() -> Service {
        Service::new(Database::default())
    }

    fn register_test_doctor(service: &mut Service, email: &str, license: &str) -> DoctorId {
        let code = service.issue_registration_code(None);
        service
            .register_doctor(DoctorRegistration {
                email: EmailInput::new(email).expect("email de test valide"),
                password: TEST_PASSWORD.to_string(),
                first_name: "Alice".to_string(),
                last_name: "Martin".to_string(),
                license_number: LicenseNumber::try_from(license).expect("licence de test valide"),
                specialty: None,
                workplaces: vec![],
                registration_code: code,
            })
            .expect("l'inscription de test doit réussir")
    }

    fn test_registration(email: &str, license: &str, code: Uuid) -> DoctorRegistration {
        DoctorRegistration {
            email: EmailInput::new(email).expect("email de test valide"),
            password: TEST_PASSWORD.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Martin".to_string(),
            license_number: LicenseNumber::try_from(license).expect("licence de test valide"),
            specialty: None,
            workplaces: vec![],
            registration_code: code,
        }
    }

    fn test_patient_record() -> Patient {
        Patient {
            unique_id: PatientId::new(),
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
            date_of_birth: None,
            medical_history: None,
            blood_group: None,
            address: None,
            email: None,
            phone_number: None,
            emergency_contact_name: None,
            emergency_contact_number: None,
            allergies: None,
            assigned_doctors: BTreeSet::new(),
        }
    }

    fn create_test_patient(service: &mut Service, doctor: DoctorId) -> PatientId {
        service
            .create_patient(doctor, test_patient_record())
            .expect("la création du patient de test doit réussir")
    }

    fn create_test_appointment(
        service: &mut Service,
        doctor: DoctorId,
        patient: PatientId,
    ) -> AppointmentId {
        service
            .create_appointment(doctor, patient, None, Utc::now(), "Contrôle".to_string())
            .expect("la création du rendez-vous de test doit réussir")
    }

    // --- Inscription ---

    #[test]
    fn test_registration_code_is_single_use() {
        let mut service = create_test_service();
        let code = service.issue_registration_code(None);

        service
            .register_doctor(test_registration("alice@example.com", "VD-10001", code))
            .expect("la première inscription doit réussir");

        let second = service.register_doctor(test_registration(
            "bob@example.com",
            "VD-10002",
            code,
        ));
        assert!(
            matches!(second, Err(ServiceError::InvalidRegistrationCode)),
            "Un code consommé doit être refusé à la seconde inscription"
        );
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_exactly_one_winner() {
        let mut service = create_test_service();
        let code = service.issue_registration_code(None);
        let service = std::sync::Arc::new(tokio::sync::RwLock::new(service));

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = std::sync::Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let registration = test_registration(
                    &format!("doctor{i}@example.com"),
                    &format!("VD-9{i:04}"),
                    code,
                );
                service.write().await.register_doctor(registration).is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("la tâche d'inscription ne doit pas paniquer") {
                successes += 1;
            }
        }

        assert_eq!(
            successes, 1,
            "Exactement une inscription concurrente doit racheter le code"
        );
        assert_eq!(
            service.read().await.db.list_doctors().count(),
            1,
            "Les tentatives perdantes ne doivent rien créer"
        );
    }

    #[test]
    fn test_unknown_code_and_used_code_are_indistinguishable() {
        let mut service = create_test_service();
        let unknown =
            service.register_doctor(test_registration("a@example.com", "VD-20001", Uuid::new_v4()));
        assert!(
            matches!(unknown, Err(ServiceError::InvalidRegistrationCode)),
            "Un code inconnu doit produire la même erreur qu'un code utilisé"
        );
    }

    #[test]
    fn test_email_bound_code_rejects_other_email() {
        let mut service = create_test_service();
        let code = service.issue_registration_code(Some("alice@example.com".to_string()));

        let wrong =
            service.register_doctor(test_registration("mallory@example.com", "VD-30001", code));
        assert!(
            matches!(wrong, Err(ServiceError::CodeEmailMismatch)),
            "Un code lié à un email doit refuser tout autre email"
        );

        // L'échec n'a pas consommé le code
        service
            .register_doctor(test_registration("alice@example.com", "VD-30002", code))
            .expect("l'email lié doit encore pouvoir racheter le code");
    }

    #[test]
    fn test_failed_registration_leaves_nothing_behind() {
        let mut service = create_test_service();
        register_test_doctor(&mut service, "alice@example.com", "VD-40001");
        let code = service.issue_registration_code(None);

        let duplicate =
            service.register_doctor(test_registration("alice@example.com", "VD-40002", code));
        assert!(
            matches!(duplicate, Err(ServiceError::EmailTaken)),
            "Un email déjà pris doit être refusé"
        );
        assert_eq!(
            service.db.list_doctors().count(),
            1,
            "L'inscription refusée ne doit créer aucun médecin"
        );
        assert!(
            !service
                .db
                .get_registration_code(code)
                .expect("le code doit exister")
                .is_used,
            "L'inscription refusée ne doit pas consommer le code"
        );
    }

    #[test]
    fn test_duplicate_license_is_rejected() {
        let mut service = create_test_service();
        register_test_doctor(&mut service, "alice@example.com", "VD-50001");
        let code = service.issue_registration_code(None);

        let duplicate =
            service.register_doctor(test_registration("bob@example.com", "VD-50001", code));
        assert!(
            matches!(duplicate, Err(ServiceError::LicenseTaken)),
            "Un numéro de licence déjà pris doit être refusé"
        );
    }

    #[test]
    fn test_weak_password_is_rejected() {
        let mut service = create_test_service();
        let code = service.issue_registration_code(None);
        let mut registration = test_registration("alice@example.com", "VD-60001", code);
        registration.password = "123456".to_string();

        let result = service.register_doctor(registration);
        assert!(
            matches!(result, Err(ServiceError::WeakPassword)),
            "Un mot de passe faible doit être refusé"
        );
    }

    // --- Connexion ---

    #[test]
    fn test_login_with_correct_credentials() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-70001");

        let (account, profile) = service
            .login("alice@example.com", TEST_PASSWORD)
            .expect("la connexion doit réussir");
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(profile.id, doctor);
    }

    #[test]
    fn test_login_with_wrong_password() {
        let mut service = create_test_service();
        register_test_doctor(&mut service, "alice@example.com", "VD-70002");

        let result = service.login("alice@example.com", "pas le bon mot de passe");
        assert!(
            matches!(result, Err(LoginError::InvalidCredentials)),
            "Un mauvais mot de passe doit être refusé"
        );
    }

    #[test]
    fn test_login_with_unknown_email() {
        let service = create_test_service();
        let result = service.login("personne@example.com", TEST_PASSWORD);
        assert!(matches!(result, Err(LoginError::InvalidCredentials)));
    }

    #[test]
    fn test_account_without_doctor_profile_is_rejected() {
        let mut service = create_test_service();
        let account = Account {
            id: AccountId::new(),
            email: "staff@example.com".to_string(),
            password: PWHash::new(TEST_PASSWORD),
            first_name: "Sacha".to_string(),
            last_name: "Blanc".to_string(),
        };
        let account_id = account.id;
        service.db.store_account(account);

        let login = service.login("staff@example.com", TEST_PASSWORD);
        assert!(
            matches!(login, Err(LoginError::NotADoctor)),
            "Un compte sans profil médecin ne doit pas pouvoir se connecter"
        );
        assert!(
            matches!(service.doctor_for(account_id), Err(ServiceError::NotADoctor)),
            "La porte de rôle doit refuser un compte sans profil médecin"
        );
    }

    // --- Périmètre de visibilité ---

    #[test]
    fn test_creator_sees_created_patient() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-80001");
        let patient = create_test_patient(&mut service, doctor);

        assert!(
            service.visible_patients(doctor).contains(&patient),
            "Le créateur doit voir le patient qu'il a créé"
        );
    }

    #[test]
    fn test_visibility_is_the_union_of_three_relations() {
        let mut service = create_test_service();
        let author = register_test_doctor(&mut service, "author@example.com", "VD-80002");
        let assigned = register_test_doctor(&mut service, "assigned@example.com", "VD-80003");
        let referred = register_test_doctor(&mut service, "referred@example.com", "VD-80004");
        let stranger = register_test_doctor(&mut service, "stranger@example.com", "VD-80005");

        let patient = create_test_patient(&mut service, author);
        service
            .db
            .get_patient_mut(patient)
            .expect("le patient doit exister")
            .assigned_doctors
            .insert(assigned);
        service
            .create_referral(
                author,
                Referral {
                    id: ReferralId::new(),
                    patient,
                    referred_to: referred,
                    referred_by: None,
                    specialty_requested: "Cardiologie".to_string(),
                    reason_for_referral: "Avis spécialisé".to_string(),
                    attached_documents: None,
                    date_of_referral: Utc::now(),
                    comments: None,
                },
            )
            .expect("le référencement doit réussir");

        for (doctor, label) in [
            (author, "auteur d'une consultation"),
            (assigned, "médecin assigné"),
            (referred, "médecin référé"),
        ] {
            assert!(
                service.visible_patients(doctor).contains(&patient),
                "Le {label} doit voir le patient"
            );
        }
        assert!(
            !service.visible_patients(stranger).contains(&patient),
            "Un médecin sans relation ne doit pas voir le patient"
        );
    }

    #[test]
    fn test_out_of_scope_lookup_matches_unknown_id() {
        let mut service = create_test_service();
        let owner = register_test_doctor(&mut service, "owner@example.com", "VD-80006");
        let stranger = register_test_doctor(&mut service, "stranger@example.com", "VD-80007");
        let patient = create_test_patient(&mut service, owner);

        let out_of_scope = service.get_patient(stranger, patient);
        let unknown = service.get_patient(stranger, PatientId::new());
        assert!(
            matches!(out_of_scope, Err(ServiceError::NotFound)),
            "Un patient hors périmètre doit être introuvable"
        );
        assert!(
            matches!(unknown, Err(ServiceError::NotFound)),
            "Hors périmètre et inexistant doivent avoir la même forme"
        );
    }

    // --- Création de patient ---

    #[test]
    fn test_patient_creation_writes_both_relations() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-90001");
        let patient = create_test_patient(&mut service, doctor);

        let record = service
            .db
            .get_patient(patient)
            .expect("le patient doit exister");
        assert!(
            record.assigned_doctors.contains(&doctor),
            "Le créateur doit être assigné au patient"
        );

        let initial: Vec<&Consultation> = service
            .db
            .list_consultations()
            .filter(|c| c.patient == patient)
            .collect();
        assert_eq!(
            initial.len(),
            1,
            "Exactement une consultation initiale doit être créée"
        );
        assert_eq!(initial[0].doctor, doctor);
        assert_eq!(initial[0].reason_for_consultation, INITIAL_CONSULTATION_REASON);
    }

    // --- Rendez-vous et archivage ---

    #[test]
    fn test_appointments_are_owner_scoped() {
        let mut service = create_test_service();
        let owner = register_test_doctor(&mut service, "owner@example.com", "VD-A0001");
        let other = register_test_doctor(&mut service, "other@example.com", "VD-A0002");
        let patient = create_test_patient(&mut service, owner);
        let appointment = create_test_appointment(&mut service, owner, patient);

        assert!(service.get_appointment(owner, appointment).is_ok());
        assert!(
            matches!(
                service.get_appointment(other, appointment),
                Err(ServiceError::NotFound)
            ),
            "Le rendez-vous d'un confrère doit être introuvable"
        );
        assert!(service.list_appointments(other).is_empty());
    }

    #[test]
    fn test_deleting_an_appointment_archives_a_snapshot_first() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-A0003");
        let account = service
            .db
            .get_doctor(doctor)
            .expect("le médecin doit exister")
            .account;
        let patient = create_test_patient(&mut service, doctor);
        let appointment = create_test_appointment(&mut service, doctor, patient);

        service
            .delete_appointment(
                doctor,
                account,
                appointment,
                Some("schedule_conflict".to_string()),
                Some("Reporté à la semaine prochaine".to_string()),
            )
            .expect("la suppression doit réussir");

        assert!(
            matches!(
                service.get_appointment(doctor, appointment),
                Err(ServiceError::NotFound)
            ),
            "Le rendez-vous supprimé ne doit plus exister"
        );

        let archives = service.list_deleted_appointments();
        assert_eq!(archives.len(), 1, "Un instantané doit avoir été archivé");
        let snapshot = archives[0];
        assert_eq!(snapshot.patient, Some(patient));
        assert_eq!(snapshot.doctor, Some(doctor));
        assert_eq!(snapshot.deleted_by, Some(account));
        assert_eq!(snapshot.deletion_reason, "schedule_conflict");
        assert_eq!(snapshot.reason_for_appointment, "Contrôle");
    }

    #[test]
    fn test_deletion_reason_defaults_to_unknown() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-A0004");
        let account = service
            .db
            .get_doctor(doctor)
            .expect("le médecin doit exister")
            .account;
        let patient = create_test_patient(&mut service, doctor);
        let appointment = create_test_appointment(&mut service, doctor, patient);

        service
            .delete_appointment(doctor, account, appointment, None, None)
            .expect("la suppression doit réussir");
        assert_eq!(service.list_deleted_appointments()[0].deletion_reason, "unknown");
    }

    // --- Cliniques ---

    #[test]
    fn test_only_the_creator_may_update_a_workplace() {
        let mut service = create_test_service();
        let creator = register_test_doctor(&mut service, "creator@example.com", "VD-B0001");
        let other = register_test_doctor(&mut service, "other@example.com", "VD-B0002");
        let workplace = service
            .create_workplace(creator, "Clinique du Lac".to_string(), "Vevey".to_string(), true)
            .expect("la création doit réussir");

        let denied = service.update_workplace(
            other,
            workplace,
            WorkplaceUpdate {
                name: Some("Clinique détournée".to_string()),
                ..Default::default()
            },
        );
        assert!(
            matches!(denied, Err(ServiceError::AccessDenied(_))),
            "Un autre médecin ne doit pas pouvoir modifier la clinique"
        );

        service
            .update_workplace(
                creator,
                workplace,
                WorkplaceUpdate {
                    address: Some("Montreux".to_string()),
                    ..Default::default()
                },
            )
            .expect("le créateur doit pouvoir modifier sa clinique");
    }

    #[test]
    fn test_workplace_without_creator_is_frozen() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-B0003");
        let workplace = Workplace {
            id: WorkplaceId::new(),
            name: "Hôpital cantonal".to_string(),
            address: "Lausanne".to_string(),
            is_public: true,
            creator: None,
        };
        let id = workplace.id;
        service.db.store_workplace(workplace);

        let denied = service.update_workplace(
            doctor,
            id,
            WorkplaceUpdate {
                is_public: Some(false),
                ..Default::default()
            },
        );
        assert!(
            matches!(denied, Err(ServiceError::AccessDenied(_))),
            "Une clinique sans créateur ne doit être modifiable par personne"
        );
    }

    #[test]
    fn test_duplicate_workplace_name_is_rejected() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-B0004");
        service
            .create_workplace(doctor, "Clinique du Lac".to_string(), "Vevey".to_string(), true)
            .expect("la première création doit réussir");

        let duplicate = service.create_workplace(
            doctor,
            "Clinique du Lac".to_string(),
            "Genève".to_string(),
            false,
        );
        assert!(matches!(duplicate, Err(ServiceError::WorkplaceNameTaken)));
    }

    #[test]
    fn test_deleting_a_workplace_detaches_references() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-B0005");
        let workplace = service
            .create_workplace(doctor, "Clinique du Lac".to_string(), "Vevey".to_string(), true)
            .expect("la création doit réussir");
        service
            .db
            .get_doctor_mut(doctor)
            .expect("le médecin doit exister")
            .workplaces
            .insert(workplace);
        let patient = create_test_patient(&mut service, doctor);
        let appointment = service
            .create_appointment(
                doctor,
                patient,
                Some(workplace),
                Utc::now(),
                "Contrôle".to_string(),
            )
            .expect("la création doit réussir");

        service
            .delete_workplace(doctor, workplace)
            .expect("la suppression doit réussir");

        assert_eq!(
            service
                .db
                .get_appointment(appointment)
                .expect("le rendez-vous doit survivre")
                .workplace,
            None,
            "La suppression de la clinique doit détacher les rendez-vous"
        );
        assert!(
            !service
                .db
                .get_doctor(doctor)
                .expect("le médecin doit exister")
                .workplaces
                .contains(&workplace),
            "La suppression de la clinique doit la retirer des profils"
        );
    }

    // --- Référencements ---

    #[test]
    fn test_both_referral_parties_may_update() {
        let mut service = create_test_service();
        let referrer = register_test_doctor(&mut service, "referrer@example.com", "VD-C0001");
        let referee = register_test_doctor(&mut service, "referee@example.com", "VD-C0002");
        let stranger = register_test_doctor(&mut service, "stranger@example.com", "VD-C0003");
        let patient = create_test_patient(&mut service, referrer);

        let referral = service
            .create_referral(
                referrer,
                Referral {
                    id: ReferralId::new(),
                    patient,
                    referred_to: referee,
                    referred_by: None,
                    specialty_requested: "Cardiologie".to_string(),
                    reason_for_referral: "Avis spécialisé".to_string(),
                    attached_documents: None,
                    date_of_referral: Utc::now(),
                    comments: None,
                },
            )
            .expect("le référencement doit réussir");

        for (party, label) in [(referrer, "référent"), (referee, "référé")] {
            service
                .update_referral(
                    party,
                    referral,
                    ReferralUpdate {
                        comments: Some(format!("Commentaire du {label}")),
                        ..Default::default()
                    },
                )
                .unwrap_or_else(|e| panic!("Le {label} doit pouvoir modifier: {e}"));
        }

        let denied = service.update_referral(
            stranger,
            referral,
            ReferralUpdate {
                comments: Some("Intrusion".to_string()),
                ..Default::default()
            },
        );
        assert!(
            matches!(denied, Err(ServiceError::NotFound)),
            "Un tiers ne doit pas même apprendre l'existence du référencement"
        );
    }

    // --- Notes et forum ---

    #[test]
    fn test_notes_are_private_to_their_author() {
        let mut service = create_test_service();
        let author = register_test_doctor(&mut service, "author@example.com", "VD-D0001");
        let other = register_test_doctor(&mut service, "other@example.com", "VD-D0002");

        let note = service
            .create_note(author, None, Some("Rappel".to_string()), "Vérifier labo".to_string())
            .expect("la création doit réussir");

        assert!(service.get_note(author, note).is_ok());
        assert!(
            matches!(service.get_note(other, note), Err(ServiceError::NotFound)),
            "La note d'un confrère doit être introuvable"
        );
    }

    #[test]
    fn test_any_doctor_may_edit_forum_content() {
        let mut service = create_test_service();
        let author = register_test_doctor(&mut service, "author@example.com", "VD-D0003");
        let other = register_test_doctor(&mut service, "other@example.com", "VD-D0004");

        let post = service
            .create_forum_post(author, "Conférence".to_string(), "Qui y va?".to_string())
            .expect("la création doit réussir");

        service
            .update_forum_post(other, post, None, Some("Qui y va cette année?".to_string()))
            .expect("le forum est modifiable par tout médecin");
        service
            .delete_forum_post(other, post)
            .expect("le forum est supprimable par tout médecin");
    }

    #[test]
    fn test_deleting_a_post_removes_its_comments() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-D0005");
        let post = service
            .create_forum_post(doctor, "Sujet".to_string(), "Contenu".to_string())
            .expect("la création doit réussir");
        service
            .create_forum_comment(doctor, post, "Réponse".to_string(), false)
            .expect("le commentaire doit réussir");

        service
            .delete_forum_post(doctor, post)
            .expect("la suppression doit réussir");
        assert!(
            service.list_forum_comments(None).is_empty(),
            "Les commentaires doivent disparaître avec le post"
        );
    }

    // --- Statistiques ---

    #[test]
    fn test_doctor_stats_counts_own_activity() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-E0001");
        let other = register_test_doctor(&mut service, "bob@example.com", "VD-E0002");
        let patient = create_test_patient(&mut service, doctor);
        create_test_patient(&mut service, other);

        service
            .create_procedure(
                doctor,
                MedicalProcedure {
                    id: ProcedureId::new(),
                    patient,
                    procedure_type: "Radiographie".to_string(),
                    procedure_date: Utc::now().date_naive(),
                    result: None,
                    attachments: None,
                    operator: None,
                },
            )
            .expect("la création doit réussir");

        let stats = service.doctor_stats(doctor);
        assert_eq!(stats.total_patients, 1);
        // La consultation initiale du patient compte
        assert_eq!(stats.total_consultations, 1);
        assert_eq!(stats.total_medical_procedures, 1);
    }

    #[test]
    fn test_global_stats_are_unscoped_totals() {
        let mut service = create_test_service();
        let alice = register_test_doctor(&mut service, "alice@example.com", "VD-E0003");
        let bob = register_test_doctor(&mut service, "bob@example.com", "VD-E0004");
        create_test_patient(&mut service, alice);
        create_test_patient(&mut service, bob);

        let stats = service.global_stats();
        assert_eq!(stats.total_doctors, 2);
        assert_eq!(stats.total_patients, 2);
        assert_eq!(stats.total_consultations, 2);
        assert_eq!(stats.stats_by_doctor.len(), 2);
    }

    #[test]
    fn test_workplace_statistics_cover_attached_doctors() {
        let mut service = create_test_service();
        let doctor = register_test_doctor(&mut service, "alice@example.com", "VD-E0005");
        let outsider = register_test_doctor(&mut service, "bob@example.com", "VD-E0006");
        let workplace = service
            .create_workplace(doctor, "Clinique du Lac".to_string(), "Vevey".to_string(), true)
            .expect("la création doit réussir");
        service
            .db
            .get_doctor_mut(doctor)
            .expect("le médecin doit exister")
            .workplaces
            .insert(workplace);

        let patient = create_test_patient(&mut service, doctor);
        create_test_patient(&mut service, outsider);
        service
            .create_appointment(
                doctor,
                patient,
                Some(workplace),
                Utc::now(),
                "Contrôle".to_string(),
            )
            .expect("la création doit réussir");

        let stats = service
            .workplace_statistics(workplace)
            .expect("la clinique doit exister");
        assert_eq!(stats.total_stats.doctors, 1);
        assert_eq!(stats.total_stats.patients, 1);
        assert_eq!(stats.total_stats.appointments, 1);
        assert_eq!(stats.doctors_breakdown.len(), 1);
        assert_eq!(stats.doctors_breakdown[0].consultations, 1);
    }

    // --- Profil ---

    #[test]
    fn test_profile_update_rejects_taken_email() {
        let mut service = create_test_service();
        register_test_doctor(&mut service, "alice@example.com", "VD-F0001");
        let bob = register_test_doctor(&mut service, "bob@example.com", "VD-F0002");

        let result = service.update_profile(
            bob,
            ProfileUpdate {
                email: Some(EmailInput::new("alice@example.com").expect("email valide")),
                ..Default::default()
            },
        );
        assert!(
            matches!(result, Err(ServiceError::EmailTaken)),
            "Un email déjà pris doit être refusé à la mise à jour du profil"
        );
    }

    #[test]
    fn test_profile_update_keeps_own_email() {
        let mut service = create_test_service();
        let alice = register_test_doctor(&mut service, "alice@example.com", "VD-F0003");

        service
            .update_profile(
                alice,
                ProfileUpdate {
                    email: Some(EmailInput::new("alice@example.com").expect("email valide")),
                    specialty: Some("Cardiologie".to_string()),
                    ..Default::default()
                },
            )
            .expect("resoumettre son propre email doit passer");
        assert_eq!(
            service
                .db
                .get_doctor(alice)
                .expect("le médecin doit exister")
                .specialty,
            "Cardiologie"
        );
    }
}
