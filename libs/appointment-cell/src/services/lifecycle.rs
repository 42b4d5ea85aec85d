// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{
    slot_end, Appointment, AppointmentError, ConflictCheckRequest, ConflictCheckResponse,
    CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentSchedulingService;

/// Operation surface handed to a transport layer. Takes request data as it
/// arrives (fields may be missing), validates its shape and delegates to the
/// scheduling service. Errors come back tagged; mapping them to status codes
/// is the caller's business.
#[derive(Clone)]
pub struct AppointmentLifecycleApi {
    service: Arc<AppointmentSchedulingService>,
}

impl AppointmentLifecycleApi {
    pub fn new(service: Arc<AppointmentSchedulingService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &AppointmentSchedulingService {
        &self.service
    }

    #[instrument(skip(self), fields(doctor_id = ?request.doctor_id, patient_id = ?request.patient_id))]
    pub async fn create(&self, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let doctor_id = required_id("doctor_id", request.doctor_id)?;
        let patient_id = required_id("patient_id", request.patient_id)?;
        let start_time = required_time("start_time", request.start_time)?;

        self.service
            .create_appointment(doctor_id, patient_id, start_time, request.reason)
            .await
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        valid_id("appointment_id", appointment_id)?;
        if let Some(doctor_id) = request.doctor_id {
            valid_id("doctor_id", doctor_id)?;
        }
        if let Some(patient_id) = request.patient_id {
            valid_id("patient_id", patient_id)?;
        }
        if let Some(start_time) = request.start_time {
            slot_end(start_time)?;
        }
        if request.is_empty() {
            debug!("Update for {} carries no changes", appointment_id);
        }

        self.service.update_appointment(appointment_id, request).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        valid_id("appointment_id", appointment_id)?;
        self.service.get_appointment(appointment_id).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        valid_id("appointment_id", appointment_id)?;
        self.service.delete_appointment(appointment_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        valid_id("doctor_id", doctor_id)?;
        self.service.list_by_doctor(doctor_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        valid_id("patient_id", patient_id)?;
        self.service.list_by_patient(patient_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<Appointment>, AppointmentError> {
        self.service.list_appointments().await
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, patient_id = %request.patient_id))]
    pub async fn check_availability(
        &self,
        request: ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        valid_id("doctor_id", request.doctor_id)?;
        valid_id("patient_id", request.patient_id)?;
        slot_end(request.start_time)?;
        self.service.check_conflicts(&request).await
    }
}

fn valid_id(field: &str, id: Uuid) -> Result<Uuid, AppointmentError> {
    if id.is_nil() {
        return Err(AppointmentError::validation(field, "must not be the nil id"));
    }
    Ok(id)
}

fn required_id(field: &str, id: Option<Uuid>) -> Result<Uuid, AppointmentError> {
    let id = id.ok_or_else(|| AppointmentError::validation(field, "is required"))?;
    valid_id(field, id)
}

fn required_time(field: &str, time: Option<DateTime<Utc>>) -> Result<DateTime<Utc>, AppointmentError> {
    let time = time.ok_or_else(|| AppointmentError::validation(field, "is required"))?;
    slot_end(time)?;
    Ok(time)
}
