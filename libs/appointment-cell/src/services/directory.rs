// libs/appointment-cell/src/services/directory.rs
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_models::entities::{Doctor, Patient};

use crate::models::{non_empty, AppointmentError, DoctorRequest, EntityKind, PatientRequest};
use crate::services::store::AppointmentStore;

fn database_error(e: anyhow::Error) -> AppointmentError {
    error!("Directory store failure: {}", e);
    AppointmentError::DatabaseError(e.to_string())
}

fn required_name(field: &str, value: &str) -> Result<String, AppointmentError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppointmentError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: &Option<String>) -> Option<String> {
    non_empty(value).map(|text| text.trim().to_string())
}

/// Registry of the doctors and patients appointments are booked for.
/// Emails, when given, identify at most one doctor and at most one patient.
pub struct ClinicDirectoryService {
    store: Arc<dyn AppointmentStore>,
}

impl ClinicDirectoryService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    // ==============================================================================
    // DOCTORS
    // ==============================================================================

    pub async fn create_doctor(&self, request: DoctorRequest) -> Result<Doctor, AppointmentError> {
        let mut doctor = Doctor::new(
            &required_name("first_name", &request.first_name)?,
            &required_name("last_name", &request.last_name)?,
        );
        doctor.specialization = optional_text(&request.specialization);
        doctor.email = optional_text(&request.email);

        if let Some(email) = doctor.email.as_deref() {
            self.ensure_doctor_email_free(email, None).await?;
        }

        let doctor = self.store.insert_doctor(doctor).await.map_err(database_error)?;
        info!("Doctor {} registered", doctor.id);
        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, AppointmentError> {
        debug!("Fetching doctor: {}", doctor_id);

        self.store
            .find_doctor(doctor_id)
            .await
            .map_err(database_error)?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Doctor, doctor_id))
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, AppointmentError> {
        self.store.list_doctors().await.map_err(database_error)
    }

    /// Replace a doctor's details. A changed email must not belong to another doctor.
    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: DoctorRequest,
    ) -> Result<Doctor, AppointmentError> {
        let mut doctor = self.get_doctor(doctor_id).await?;

        doctor.first_name = required_name("first_name", &request.first_name)?;
        doctor.last_name = required_name("last_name", &request.last_name)?;
        doctor.specialization = optional_text(&request.specialization);

        let email = optional_text(&request.email);
        if email != doctor.email {
            if let Some(new_email) = email.as_deref() {
                self.ensure_doctor_email_free(new_email, Some(doctor_id)).await?;
            }
            doctor.email = email;
        }

        let doctor = self.store.save_doctor(doctor).await.map_err(database_error)?;
        info!("Doctor {} updated", doctor_id);
        Ok(doctor)
    }

    /// Remove a doctor that no appointment refers to.
    pub async fn delete_doctor(&self, doctor_id: Uuid) -> Result<(), AppointmentError> {
        self.get_doctor(doctor_id).await?;

        let booked = self.store.list_by_doctor(doctor_id).await.map_err(database_error)?;
        if !booked.is_empty() {
            warn!("Doctor {} still has {} appointments", doctor_id, booked.len());
            return Err(AppointmentError::validation("doctor_id", "has appointments"));
        }

        if !self.store.delete_doctor(doctor_id).await.map_err(database_error)? {
            return Err(AppointmentError::not_found(EntityKind::Doctor, doctor_id));
        }

        info!("Doctor {} deleted", doctor_id);
        Ok(())
    }

    // ==============================================================================
    // PATIENTS
    // ==============================================================================

    pub async fn create_patient(&self, request: PatientRequest) -> Result<Patient, AppointmentError> {
        let mut patient = Patient::new(
            &required_name("first_name", &request.first_name)?,
            &required_name("last_name", &request.last_name)?,
        );
        patient.email = optional_text(&request.email);

        if let Some(email) = patient.email.as_deref() {
            self.ensure_patient_email_free(email, None).await?;
        }

        let patient = self.store.insert_patient(patient).await.map_err(database_error)?;
        info!("Patient {} registered", patient.id);
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, AppointmentError> {
        debug!("Fetching patient: {}", patient_id);

        self.store
            .find_patient(patient_id)
            .await
            .map_err(database_error)?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Patient, patient_id))
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, AppointmentError> {
        self.store.list_patients().await.map_err(database_error)
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: PatientRequest,
    ) -> Result<Patient, AppointmentError> {
        let mut patient = self.get_patient(patient_id).await?;

        patient.first_name = required_name("first_name", &request.first_name)?;
        patient.last_name = required_name("last_name", &request.last_name)?;

        let email = optional_text(&request.email);
        if email != patient.email {
            if let Some(new_email) = email.as_deref() {
                self.ensure_patient_email_free(new_email, Some(patient_id)).await?;
            }
            patient.email = email;
        }

        let patient = self.store.save_patient(patient).await.map_err(database_error)?;
        info!("Patient {} updated", patient_id);
        Ok(patient)
    }

    pub async fn delete_patient(&self, patient_id: Uuid) -> Result<(), AppointmentError> {
        self.get_patient(patient_id).await?;

        let booked = self.store.list_by_patient(patient_id).await.map_err(database_error)?;
        if !booked.is_empty() {
            warn!("Patient {} still has {} appointments", patient_id, booked.len());
            return Err(AppointmentError::validation("patient_id", "has appointments"));
        }

        if !self.store.delete_patient(patient_id).await.map_err(database_error)? {
            return Err(AppointmentError::not_found(EntityKind::Patient, patient_id));
        }

        info!("Patient {} deleted", patient_id);
        Ok(())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn ensure_doctor_email_free(
        &self,
        email: &str,
        owner: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let existing = self.store.find_doctor_by_email(email).await.map_err(database_error)?;
        match existing {
            Some(doctor) if Some(doctor.id) != owner => {
                warn!("Email {} already belongs to doctor {}", email, doctor.id);
                Err(AppointmentError::validation("email", "already registered to another doctor"))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_patient_email_free(
        &self,
        email: &str,
        owner: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let existing = self.store.find_patient_by_email(email).await.map_err(database_error)?;
        match existing {
            Some(patient) if Some(patient.id) != owner => {
                warn!("Email {} already belongs to patient {}", email, patient.id);
                Err(AppointmentError::validation("email", "already registered to another patient"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_name_trims_and_rejects_blank() {
        assert_eq!(required_name("first_name", "  Ana "), Ok("Ana".to_string()));
        assert_eq!(
            required_name("last_name", "   "),
            Err(AppointmentError::validation("last_name", "is required"))
        );
    }

    #[test]
    fn test_optional_text_drops_blank_values() {
        assert_eq!(optional_text(&Some(" a@b.org ".to_string())), Some("a@b.org".to_string()));
        assert_eq!(optional_text(&Some(String::new())), None);
        assert_eq!(optional_text(&None), None);
    }
}
