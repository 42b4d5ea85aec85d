use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::entities::{Doctor, Patient};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_token: String,
    pub recheck_conflicts_on_update: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_token: "test-service-token".to_string(),
            recheck_conflicts_on_update: false,
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    /// Config with no database, so services fall back to in-memory storage.
    pub fn unconfigured() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_token: String::new(),
            recheck_conflicts_on_update: false,
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_token: self.supabase_service_token.clone(),
            recheck_conflicts_on_update: self.recheck_conflicts_on_update,
        }
    }
}

pub struct TestClinic;

impl TestClinic {
    pub fn doctor(last_name: &str) -> Doctor {
        let mut doctor = Doctor::new("Dr.", last_name);
        doctor.specialization = Some("General Practice".to_string());
        doctor
    }

    pub fn patient(first_name: &str) -> Patient {
        Patient::new(first_name, "Patient")
    }

    /// A fixed calendar instant on 2024-03-01.
    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0)
            .single()
            .unwrap_or_else(|| panic!("invalid test time {}:{}", hour, minute))
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str, last_name: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "first_name": "Dr.",
            "last_name": last_name,
            "specialization": "General Practice",
            "email": "doctor@example.com",
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn patient_response(patient_id: &str, first_name: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "first_name": first_name,
            "last_name": "Patient",
            "email": "patient@example.com",
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        doctor_id: &str,
        patient_id: &str,
        start_time: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "start_time": start_time,
            "duration_minutes": 30,
            "reason": "Routine checkup",
            "status": "scheduled",
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
