// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use shared_config::AppConfig;

/// Every appointment occupies a slot of this length.
pub const APPOINTMENT_DURATION_MINUTES: i64 = 30;

pub fn appointment_duration() -> Duration {
    Duration::minutes(APPOINTMENT_DURATION_MINUTES)
}

/// End of a slot starting at `start`. Starts whose slot would run past the
/// representable range are rejected.
pub fn slot_end(start: DateTime<Utc>) -> Result<DateTime<Utc>, AppointmentError> {
    start
        .checked_add_signed(appointment_duration())
        .ok_or_else(|| AppointmentError::validation("start_time", "out of range"))
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the occupied window, exclusive.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time
            .checked_add_signed(Duration::minutes(self.duration_minutes))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Cancelled appointments give their slot back.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn involves(&self, subject: Subject) -> bool {
        match subject {
            Subject::Doctor(id) => self.doctor_id == id,
            Subject::Patient(id) => self.patient_id == id,
        }
    }
}

/// An appointment that has passed validation but has no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn into_appointment(self, id: Uuid, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            reason: self.reason,
            status: self.status,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// The party whose calendar is checked for double-booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Doctor(Uuid),
    Patient(Uuid),
}

impl Subject {
    pub fn id(&self) -> Uuid {
        match self {
            Subject::Doctor(id) | Subject::Patient(id) => *id,
        }
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Doctor(_) => SubjectKind::Doctor,
            Subject::Patient(_) => SubjectKind::Patient,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Doctor,
    Patient,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::Doctor => write!(f, "doctor"),
            SubjectKind::Patient => write!(f, "patient"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Doctor,
    Patient,
    Appointment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Doctor => write!(f, "Doctor"),
            EntityKind::Patient => write!(f, "Patient"),
            EntityKind::Appointment => write!(f, "Appointment"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking request as it arrives from a transport layer; every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Partial update. Absent or empty fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.doctor_id.is_none()
            && self.patient_id.is_none()
            && self.start_time.is_none()
            && non_empty(&self.reason).is_none()
            && self.status.is_none()
            && non_empty(&self.notes).is_none()
    }
}

/// Returns the text only when it carries something other than whitespace.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.trim().is_empty())
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

/// Registration or full replacement of a doctor's details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorRequest {
    pub first_name: String,
    pub last_name: String,
    pub specialization: Option<String>,
    pub email: Option<String>,
}

/// Registration or full replacement of a patient's details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub doctor_conflicts: Vec<Appointment>,
    pub patient_conflicts: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("{kind} not found with ID: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Schedule conflict for {subject}: {reason}")]
    ScheduleConflict { subject: SubjectKind, reason: String },

    #[error("Validation error on {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        AppointmentError::NotFound { kind, id }
    }

    pub fn unavailable(subject: SubjectKind) -> Self {
        AppointmentError::ScheduleConflict {
            subject,
            reason: format!("{} unavailable", subject),
        }
    }

    pub fn validation(field: &str, reason: &str) -> Self {
        AppointmentError::ValidationError {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Domain errors are final answers for the caller; anything else is infrastructure.
    pub fn is_domain_error(&self) -> bool {
        !matches!(self, AppointmentError::DatabaseError(_))
    }
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone, Default)]
pub struct SchedulingRules {
    /// When set, moving an appointment (new start, doctor or patient) or
    /// reactivating a cancelled one runs the same doctor/patient conflict
    /// checks as booking. Off by default: updates historically persisted
    /// without a re-check.
    pub recheck_conflicts_on_update: bool,
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recheck_conflicts_on_update: config.recheck_conflicts_on_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample(status: AppointmentStatus) -> Appointment {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        NewAppointment {
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            start_time: start,
            duration_minutes: APPOINTMENT_DURATION_MINUTES,
            reason: None,
            status,
            notes: None,
        }
        .into_appointment(Uuid::new_v4(), start)
    }

    #[test]
    fn test_end_time_is_thirty_minutes_after_start() {
        let appointment = sample(AppointmentStatus::Scheduled);
        assert_eq!(
            appointment.end_time(),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_slot_end_rejects_unrepresentable_starts() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(slot_end(start), Ok(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()));
        assert_eq!(
            slot_end(DateTime::<Utc>::MAX_UTC),
            Err(AppointmentError::validation("start_time", "out of range"))
        );
    }

    #[test]
    fn test_cancelled_appointment_releases_slot() {
        assert!(sample(AppointmentStatus::Scheduled).occupies_slot());
        assert!(sample(AppointmentStatus::Completed).occupies_slot());
        assert!(!sample(AppointmentStatus::Cancelled).occupies_slot());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(json!(AppointmentStatus::NoShow), json!("no_show"));
        assert_eq!(AppointmentStatus::Scheduled.to_string(), "scheduled");
    }

    #[test]
    fn test_error_messages() {
        let id = Uuid::nil();
        assert_eq!(
            AppointmentError::not_found(EntityKind::Doctor, id).to_string(),
            format!("Doctor not found with ID: {}", id)
        );
        assert_eq!(
            AppointmentError::unavailable(SubjectKind::Patient).to_string(),
            "Schedule conflict for patient: patient unavailable"
        );
        assert!(!AppointmentError::DatabaseError("down".into()).is_domain_error());
        assert!(AppointmentError::validation("doctor_id", "is required").is_domain_error());
    }

    #[test]
    fn test_update_request_emptiness_ignores_blank_text() {
        let request = UpdateAppointmentRequest {
            reason: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(request.is_empty());

        let request = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Completed),
            ..Default::default()
        };
        assert!(!request.is_empty());
    }
}
