// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::entities::{Doctor, Patient};

use crate::models::{Appointment, NewAppointment, Subject};

/// Persistence seam for the scheduling core. Implementations only store and
/// fetch; business validation lives in the scheduling service.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>>;

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>>;

    /// Doctors ordered by last name, then first name.
    async fn list_doctors(&self) -> Result<Vec<Doctor>>;

    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor>;

    async fn save_doctor(&self, doctor: Doctor) -> Result<Doctor>;

    async fn delete_doctor(&self, id: Uuid) -> Result<bool>;

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>>;

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>>;

    /// Patients ordered by last name, then first name.
    async fn list_patients(&self) -> Result<Vec<Patient>>;

    async fn insert_patient(&self, patient: Patient) -> Result<Patient>;

    async fn save_patient(&self, patient: Patient) -> Result<Patient>;

    async fn delete_patient(&self, id: Uuid) -> Result<bool>;

    /// Persist a new appointment, assigning its id and timestamps.
    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment>;

    /// Overwrite the stored appointment with the same id.
    async fn save_appointment(&self, appointment: Appointment) -> Result<Appointment>;

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// Returns `false` when nothing was stored under `id`.
    async fn delete_appointment(&self, id: Uuid) -> Result<bool>;

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>>;

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>>;

    async fn list_appointments(&self) -> Result<Vec<Appointment>>;

    /// Appointments of `subject` whose start falls in `[from, to)`.
    async fn list_starting_between(
        &self,
        subject: Subject,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;
}

#[derive(Default)]
struct Tables {
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Tables {
    fn sorted<F>(&self, keep: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .values()
            .filter(|apt| keep(*apt))
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| (apt.start_time, apt.created_at, apt.id));
        appointments
    }
}

/// Process-local store, used for tests and when no database is configured.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    tables: RwLock<Tables>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_name<T>(rows: &HashMap<Uuid, T>, name: impl Fn(&T) -> (String, String, Uuid)) -> Vec<T>
where
    T: Clone,
{
    let mut listed: Vec<T> = rows.values().cloned().collect();
    listed.sort_by_key(|row| name(row));
    listed
}

fn insert_new<T>(rows: &mut HashMap<Uuid, T>, id: Uuid, row: T, kind: &str) -> Result<T>
where
    T: Clone,
{
    if rows.contains_key(&id) {
        return Err(anyhow!("{} {} is already stored", kind, id));
    }
    rows.insert(id, row.clone());
    Ok(row)
}

fn replace_existing<T>(rows: &mut HashMap<Uuid, T>, id: Uuid, row: T, kind: &str) -> Result<T>
where
    T: Clone,
{
    if !rows.contains_key(&id) {
        return Err(anyhow!("{} {} is not stored", kind, id));
    }
    rows.insert(id, row.clone());
    Ok(row)
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>> {
        Ok(self.tables.read().await.doctors.get(&id).cloned())
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>> {
        let tables = self.tables.read().await;
        Ok(tables
            .doctors
            .values()
            .find(|doctor| doctor.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        let tables = self.tables.read().await;
        Ok(by_name(&tables.doctors, |d| (d.last_name.clone(), d.first_name.clone(), d.id)))
    }

    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor> {
        debug!("Registering doctor {}", doctor.id);
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.doctors, doctor.id, doctor, "doctor")
    }

    async fn save_doctor(&self, doctor: Doctor) -> Result<Doctor> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.doctors, doctor.id, doctor, "doctor")
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.doctors.remove(&id).is_some())
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self.tables.read().await.patients.get(&id).cloned())
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        let tables = self.tables.read().await;
        Ok(tables
            .patients
            .values()
            .find(|patient| patient.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>> {
        let tables = self.tables.read().await;
        Ok(by_name(&tables.patients, |p| (p.last_name.clone(), p.first_name.clone(), p.id)))
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient> {
        debug!("Registering patient {}", patient.id);
        let mut tables = self.tables.write().await;
        insert_new(&mut tables.patients, patient.id, patient, "patient")
    }

    async fn save_patient(&self, patient: Patient) -> Result<Patient> {
        let mut tables = self.tables.write().await;
        replace_existing(&mut tables.patients, patient.id, patient, "patient")
    }

    async fn delete_patient(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.patients.remove(&id).is_some())
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment> {
        let mut tables = self.tables.write().await;

        let mut id = Uuid::new_v4();
        while tables.appointments.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let appointment = appointment.into_appointment(id, Utc::now());
        tables.appointments.insert(id, appointment.clone());
        Ok(appointment)
    }

    async fn save_appointment(&self, mut appointment: Appointment) -> Result<Appointment> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .appointments
            .get(&appointment.id)
            .ok_or_else(|| anyhow!("appointment {} is not stored", appointment.id))?;

        appointment.created_at = existing.created_at;
        appointment.updated_at = Utc::now();
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.appointments.remove(&id).is_some())
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.tables.read().await.sorted(|apt| apt.doctor_id == doctor_id))
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.tables.read().await.sorted(|apt| apt.patient_id == patient_id))
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>> {
        Ok(self.tables.read().await.sorted(|_| true))
    }

    async fn list_starting_between(
        &self,
        subject: Subject,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        Ok(self.tables.read().await.sorted(|apt| {
            apt.involves(subject) && apt.start_time >= from && apt.start_time < to
        }))
    }
}
