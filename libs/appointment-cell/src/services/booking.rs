// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_models::entities::{Doctor, Patient};

use crate::models::{
    non_empty, slot_end, Appointment, AppointmentError, AppointmentStatus,
    ConflictCheckRequest, ConflictCheckResponse, EntityKind, NewAppointment, SchedulingRules,
    Subject, SubjectKind, UpdateAppointmentRequest, APPOINTMENT_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::consistency::SchedulingLocks;
use crate::services::directory::ClinicDirectoryService;
use crate::services::store::{AppointmentStore, InMemoryAppointmentStore};
use crate::services::supabase_store::SupabaseAppointmentStore;

fn database_error(e: anyhow::Error) -> AppointmentError {
    error!("Appointment store failure: {}", e);
    AppointmentError::DatabaseError(e.to_string())
}

/// The only path that writes appointments. Enforces that neither the doctor
/// nor the patient is booked twice in overlapping slots.
pub struct AppointmentSchedulingService {
    store: Arc<dyn AppointmentStore>,
    conflict_service: ConflictDetectionService,
    locks: SchedulingLocks,
    rules: SchedulingRules,
}

impl AppointmentSchedulingService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self::with_rules(store, SchedulingRules::default())
    }

    pub fn with_rules(store: Arc<dyn AppointmentStore>, rules: SchedulingRules) -> Self {
        let conflict_service = ConflictDetectionService::new(Arc::clone(&store));

        Self {
            store,
            conflict_service,
            locks: SchedulingLocks::new(),
            rules,
        }
    }

    /// Supabase-backed service when configured, in-memory otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let store: Arc<dyn AppointmentStore> = if config.is_configured() {
            info!("Using Supabase appointment store at {}", config.supabase_url);
            Arc::new(SupabaseAppointmentStore::new(config))
        } else {
            warn!("Supabase not configured, appointments are kept in memory");
            Arc::new(InMemoryAppointmentStore::new())
        };

        Self::with_rules(store, SchedulingRules::from_config(config))
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Doctor/patient registry over the same store this service books against.
    pub fn directory(&self) -> ClinicDirectoryService {
        ClinicDirectoryService::new(Arc::clone(&self.store))
    }

    /// Book a slot for a doctor/patient pair.
    ///
    /// References are resolved before any conflict query runs. Doctor
    /// conflicts are reported ahead of patient conflicts.
    pub async fn create_appointment(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        start_time: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} at {}",
              patient_id, doctor_id, start_time);

        let end_time = slot_end(start_time)?;

        self.resolve_doctor(doctor_id).await?;
        self.resolve_patient(patient_id).await?;

        let _guards = self
            .locks
            .acquire(&[Subject::Doctor(doctor_id), Subject::Patient(patient_id)])
            .await;

        self.book_locked(doctor_id, patient_id, start_time, end_time, reason)
            .await
    }

    async fn book_locked(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.ensure_slot_free(doctor_id, patient_id, start_time, end_time, None)
            .await?;

        let appointment = self
            .store
            .insert_appointment(NewAppointment {
                doctor_id,
                patient_id,
                start_time,
                duration_minutes: APPOINTMENT_DURATION_MINUTES,
                reason: non_empty(&reason).map(str::to_string),
                status: AppointmentStatus::Scheduled,
                notes: None,
            })
            .await
            .map_err(database_error)?;

        info!("Appointment {} booked successfully with doctor {}",
              appointment.id, doctor_id);
        Ok(appointment)
    }

    /// Apply a partial update. Changed doctor/patient references are resolved
    /// before anything is written.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        if let Some(start_time) = request.start_time {
            slot_end(start_time)?;
        }

        let current = self.get_appointment(appointment_id).await?;

        if let Some(patient_id) = request.patient_id {
            if patient_id != current.patient_id {
                self.resolve_patient(patient_id).await?;
            }
        }
        if let Some(doctor_id) = request.doctor_id {
            if doctor_id != current.doctor_id {
                self.resolve_doctor(doctor_id).await?;
            }
        }

        let target = apply_update(current.clone(), &request);

        if !(claims_new_slot(&current, &target) && self.rules.recheck_conflicts_on_update) {
            return self.persist_update(target).await;
        }

        let _guards = self
            .locks
            .acquire(&[Subject::Doctor(target.doctor_id), Subject::Patient(target.patient_id)])
            .await;

        self.move_locked(appointment_id, request).await
    }

    async fn move_locked(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        // Reload under the lock; the row may have changed while waiting.
        let current = self.get_appointment(appointment_id).await?;
        let updated = apply_update(current, &request);

        if updated.occupies_slot() {
            self.ensure_slot_free(
                updated.doctor_id,
                updated.patient_id,
                updated.start_time,
                updated.end_time(),
                Some(appointment_id),
            )
            .await?;
        }

        self.persist_update(updated).await
    }

    async fn persist_update(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let id = appointment.id;
        let saved = self
            .store
            .save_appointment(appointment)
            .await
            .map_err(database_error)?;

        info!("Appointment {} updated successfully", id);
        Ok(saved)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        self.store
            .find_appointment(appointment_id)
            .await
            .map_err(database_error)?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Appointment, appointment_id))
    }

    /// Delete by id. A missing id is an error, not a silent success.
    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        debug!("Deleting appointment: {}", appointment_id);

        let existing = self.get_appointment(appointment_id).await?;

        let removed = self
            .store
            .delete_appointment(existing.id)
            .await
            .map_err(database_error)?;

        if !removed {
            // Deleted concurrently between the lookup and the delete.
            return Err(AppointmentError::not_found(EntityKind::Appointment, appointment_id));
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.list_by_doctor(doctor_id).await.map_err(database_error)
    }

    pub async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.list_by_patient(patient_id).await.map_err(database_error)
    }

    pub async fn list_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.list_appointments().await.map_err(database_error)
    }

    /// Conflict check for a prospective slot, without booking it.
    pub async fn check_conflicts(
        &self,
        request: &ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.conflict_service.check_conflicts(request).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn resolve_doctor(&self, doctor_id: Uuid) -> Result<Doctor, AppointmentError> {
        self.store
            .find_doctor(doctor_id)
            .await
            .map_err(database_error)?
            .ok_or_else(|| {
                warn!("Doctor {} not found", doctor_id);
                AppointmentError::not_found(EntityKind::Doctor, doctor_id)
            })
    }

    async fn resolve_patient(&self, patient_id: Uuid) -> Result<Patient, AppointmentError> {
        self.store
            .find_patient(patient_id)
            .await
            .map_err(database_error)?
            .ok_or_else(|| {
                warn!("Patient {} not found", patient_id);
                AppointmentError::not_found(EntityKind::Patient, patient_id)
            })
    }

    async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let doctor_conflicts = self
            .conflict_service
            .find_blocking(Subject::Doctor(doctor_id), start_time, end_time, exclude_appointment_id)
            .await?;
        if !doctor_conflicts.is_empty() {
            return Err(AppointmentError::unavailable(SubjectKind::Doctor));
        }

        let patient_conflicts = self
            .conflict_service
            .find_blocking(Subject::Patient(patient_id), start_time, end_time, exclude_appointment_id)
            .await?;
        if !patient_conflicts.is_empty() {
            return Err(AppointmentError::unavailable(SubjectKind::Patient));
        }

        Ok(())
    }
}

/// A move to another start, doctor or patient, or a cancelled appointment
/// taking its slot back.
fn claims_new_slot(current: &Appointment, target: &Appointment) -> bool {
    if !target.occupies_slot() {
        return false;
    }

    !current.occupies_slot()
        || target.start_time != current.start_time
        || target.doctor_id != current.doctor_id
        || target.patient_id != current.patient_id
}

/// Copy every present, non-empty field of the request onto the appointment.
fn apply_update(mut appointment: Appointment, request: &UpdateAppointmentRequest) -> Appointment {
    if let Some(patient_id) = request.patient_id {
        appointment.patient_id = patient_id;
    }
    if let Some(doctor_id) = request.doctor_id {
        appointment.doctor_id = doctor_id;
    }
    if let Some(start_time) = request.start_time {
        appointment.start_time = start_time;
    }
    if let Some(reason) = non_empty(&request.reason) {
        appointment.reason = Some(reason.to_string());
    }
    if let Some(status) = request.status {
        appointment.status = status;
    }
    if let Some(notes) = non_empty(&request.notes) {
        appointment.notes = Some(notes.to_string());
    }
    appointment
}
