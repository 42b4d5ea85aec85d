// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::entities::{Doctor, Patient};

use crate::models::{Appointment, NewAppointment, Subject};
use crate::services::store::AppointmentStore;

/// Appointment persistence over the PostgREST `doctors`, `patients` and
/// `appointments` tables.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            auth_token: config.service_token().to_string(),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: auth_token.to_string(),
        }
    }

    fn token(&self) -> Option<&str> {
        if self.auth_token.is_empty() {
            None
        } else {
            Some(&self.auth_token)
        }
    }

    async fn select_rows<T>(&self, table: &str, query: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let rows = self.supabase.select(table, query, self.token()).await?;
        parse_rows(rows).with_context(|| format!("Failed to parse {} rows", table))
    }

    async fn select_one<T>(&self, table: &str, id: Uuid) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let mut rows = self.select_rows(table, &format!("id=eq.{}", id)).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn insert_row<T>(&self, table: &str, row: &T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let body = serde_json::to_value(row)?;
        let result = self.supabase.write_returning(
            Method::POST,
            &format!("/rest/v1/{}", table),
            self.token(),
            Some(body),
        ).await?;

        first_row(result, &format!("create {}", table))
    }

    async fn patch_row<T>(&self, table: &str, id: Uuid, body: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let result = self.supabase.write_returning(
            Method::PATCH,
            &format!("/rest/v1/{}?id=eq.{}", table, id),
            self.token(),
            Some(body),
        ).await?;

        first_row(result, &format!("update {}", table))
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> Result<bool> {
        let result = self.supabase.write_returning(
            Method::DELETE,
            &format!("/rest/v1/{}?id=eq.{}", table, id),
            self.token(),
            None,
        ).await?;

        Ok(!result.is_empty())
    }

    async fn select_by_email<T>(&self, table: &str, email: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let query = format!("email=eq.{}&limit=1", urlencoding::encode(email));
        let mut rows = self.select_rows(table, &query).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn list_appointments_where(&self, filters: &[String]) -> Result<Vec<Appointment>> {
        let mut query_parts = filters.to_vec();
        query_parts.push("order=start_time.asc".to_string());
        self.select_rows("appointments", &query_parts.join("&")).await
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

fn first_row<T: DeserializeOwned>(rows: Vec<Value>, action: &str) -> Result<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Failed to {}: no row returned", action))?;

    serde_json::from_value(row)
        .with_context(|| format!("Failed to parse result of {}", action))
}

const BY_NAME: &str = "order=last_name.asc,first_name.asc";

/// RFC 3339 timestamp made safe for a PostgREST query string (`+` offsets).
fn encode_time(time: DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339()).into_owned()
}

fn subject_column(subject: Subject) -> &'static str {
    match subject {
        Subject::Doctor(_) => "doctor_id",
        Subject::Patient(_) => "patient_id",
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>> {
        debug!("Looking up doctor {}", id);
        self.select_one("doctors", id).await
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>> {
        self.select_by_email("doctors", email).await
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>> {
        self.select_rows("doctors", BY_NAME).await
    }

    async fn insert_doctor(&self, doctor: Doctor) -> Result<Doctor> {
        self.insert_row("doctors", &doctor).await
    }

    async fn save_doctor(&self, doctor: Doctor) -> Result<Doctor> {
        let update_data = json!({
            "first_name": doctor.first_name,
            "last_name": doctor.last_name,
            "specialization": doctor.specialization,
            "email": doctor.email
        });
        self.patch_row("doctors", doctor.id, update_data).await
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool> {
        self.delete_row("doctors", id).await
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        debug!("Looking up patient {}", id);
        self.select_one("patients", id).await
    }

    async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>> {
        self.select_by_email("patients", email).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>> {
        self.select_rows("patients", BY_NAME).await
    }

    async fn insert_patient(&self, patient: Patient) -> Result<Patient> {
        self.insert_row("patients", &patient).await
    }

    async fn save_patient(&self, patient: Patient) -> Result<Patient> {
        let update_data = json!({
            "first_name": patient.first_name,
            "last_name": patient.last_name,
            "email": patient.email
        });
        self.patch_row("patients", patient.id, update_data).await
    }

    async fn delete_patient(&self, id: Uuid) -> Result<bool> {
        self.delete_row("patients", id).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment> {
        let now = Utc::now();
        let appointment_data = json!({
            "doctor_id": appointment.doctor_id,
            "patient_id": appointment.patient_id,
            "start_time": appointment.start_time.to_rfc3339(),
            "duration_minutes": appointment.duration_minutes,
            "reason": appointment.reason,
            "status": appointment.status.to_string(),
            "notes": appointment.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result = self.supabase.write_returning(
            Method::POST,
            "/rest/v1/appointments",
            self.token(),
            Some(appointment_data),
        ).await?;

        first_row(result, "create appointment")
    }

    async fn save_appointment(&self, appointment: Appointment) -> Result<Appointment> {
        // id and created_at are never rewritten
        let update_data = json!({
            "doctor_id": appointment.doctor_id,
            "patient_id": appointment.patient_id,
            "start_time": appointment.start_time.to_rfc3339(),
            "duration_minutes": appointment.duration_minutes,
            "reason": appointment.reason,
            "status": appointment.status.to_string(),
            "notes": appointment.notes,
            "updated_at": Utc::now().to_rfc3339()
        });

        self.patch_row("appointments", appointment.id, update_data).await
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        self.select_one("appointments", id).await
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool> {
        self.delete_row("appointments", id).await
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>> {
        self.list_appointments_where(&[format!("doctor_id=eq.{}", doctor_id)]).await
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>> {
        self.list_appointments_where(&[format!("patient_id=eq.{}", patient_id)]).await
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>> {
        self.list_appointments_where(&[]).await
    }

    async fn list_starting_between(
        &self,
        subject: Subject,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        self.list_appointments_where(&[
            format!("{}=eq.{}", subject_column(subject), subject.id()),
            format!("start_time=gte.{}", encode_time(from)),
            format!("start_time=lt.{}", encode_time(to)),
        ]).await
    }
}
