// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use std::sync::Arc;

use crate::models::{
    appointment_duration, slot_end, Appointment, AppointmentError, ConflictCheckRequest,
    ConflictCheckResponse, Subject,
};
use crate::services::store::AppointmentStore;

/// Two half-open windows `[start1, end1)` and `[start2, end2)` overlap iff
/// `start1 < end2 && start2 < end1`. Touching boundaries do not overlap.
pub fn windows_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

fn earliest_running_start(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_sub_signed(appointment_duration())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Every stored appointment of `subject` whose window intersects `[start, end)`.
    pub async fn find_conflicts(
        &self,
        subject: Subject,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Checking conflicts for {} from {} to {}", subject, start, end);

        if end <= start {
            return Ok(Vec::new());
        }

        // Slots have a fixed length, so nothing starting a full slot before
        // `start` can still be running at `start`.
        let candidates = self
            .store
            .list_starting_between(subject, earliest_running_start(start), end)
            .await
            .map_err(|e| {
                error!("Conflict lookup failed for {}: {}", subject, e);
                AppointmentError::DatabaseError(e.to_string())
            })?;

        let conflicts: Vec<Appointment> = candidates
            .into_iter()
            .filter(|apt| windows_overlap(start, end, apt.start_time, apt.end_time()))
            .collect();

        if !conflicts.is_empty() {
            debug!("{} overlapping appointments found for {}", conflicts.len(), subject);
        }

        Ok(conflicts)
    }

    /// Appointments that actually hold the slot: cancelled ones and the
    /// excluded appointment are ignored.
    pub async fn find_blocking(
        &self,
        subject: Subject,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let blocking: Vec<Appointment> = self
            .find_conflicts(subject, start, end)
            .await?
            .into_iter()
            .filter(|apt| apt.occupies_slot())
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .collect();

        if !blocking.is_empty() {
            warn!("Conflict detected for {} - {} conflicting appointments",
                  subject, blocking.len());
        }

        Ok(blocking)
    }

    /// Report whether a slot is free for both the doctor and the patient, without booking it.
    pub async fn check_conflicts(
        &self,
        request: &ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let start_time = request.start_time;
        let end_time = slot_end(start_time)?;

        let doctor_conflicts = self.find_blocking(
            Subject::Doctor(request.doctor_id),
            start_time,
            end_time,
            request.exclude_appointment_id,
        ).await?;

        let patient_conflicts = self.find_blocking(
            Subject::Patient(request.patient_id),
            start_time,
            end_time,
            request.exclude_appointment_id,
        ).await?;

        Ok(ConflictCheckResponse {
            has_conflict: !doctor_conflicts.is_empty() || !patient_conflicts.is_empty(),
            start_time,
            end_time,
            doctor_conflicts,
            patient_conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::{AppointmentStatus, NewAppointment, APPOINTMENT_DURATION_MINUTES};
    use crate::services::store::InMemoryAppointmentStore;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    async fn seed(
        store: &InMemoryAppointmentStore,
        doctor_id: Uuid,
        patient_id: Uuid,
        start: DateTime<Utc>,
        status: AppointmentStatus,
    ) -> Appointment {
        store
            .insert_appointment(NewAppointment {
                doctor_id,
                patient_id,
                start_time: start,
                duration_minutes: APPOINTMENT_DURATION_MINUTES,
                reason: None,
                status,
                notes: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_overlap_rule_is_half_open() {
        // identical windows
        assert!(windows_overlap(at(10, 0), at(10, 30), at(10, 0), at(10, 30)));
        // partial overlap on either side
        assert!(windows_overlap(at(10, 0), at(10, 30), at(10, 15), at(10, 45)));
        assert!(windows_overlap(at(10, 15), at(10, 45), at(10, 0), at(10, 30)));
        // containment
        assert!(windows_overlap(at(9, 0), at(12, 0), at(10, 0), at(10, 30)));
        // touching boundaries
        assert!(!windows_overlap(at(10, 0), at(10, 30), at(10, 30), at(11, 0)));
        assert!(!windows_overlap(at(10, 30), at(11, 0), at(10, 0), at(10, 30)));
        // disjoint
        assert!(!windows_overlap(at(8, 0), at(8, 30), at(10, 0), at(10, 30)));
    }

    #[test]
    fn test_candidate_window_saturates_at_the_earliest_instant() {
        assert_eq!(earliest_running_start(at(10, 0)), at(9, 30));
        assert_eq!(earliest_running_start(DateTime::<Utc>::MIN_UTC), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_find_conflicts_returns_only_intersecting_windows() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let doctor_id = Uuid::new_v4();
        let before = seed(&store, doctor_id, Uuid::new_v4(), at(9, 30), AppointmentStatus::Scheduled).await;
        let overlapping = seed(&store, doctor_id, Uuid::new_v4(), at(9, 45), AppointmentStatus::Scheduled).await;
        let after = seed(&store, doctor_id, Uuid::new_v4(), at(10, 30), AppointmentStatus::Scheduled).await;

        let service = ConflictDetectionService::new(store.clone());
        let conflicts = service
            .find_conflicts(Subject::Doctor(doctor_id), at(10, 0), at(10, 30))
            .await
            .unwrap();

        let ids: Vec<Uuid> = conflicts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![overlapping.id]);
        assert!(!ids.contains(&before.id));
        assert!(!ids.contains(&after.id));
    }

    #[tokio::test]
    async fn test_find_conflicts_empty_when_no_appointments() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let service = ConflictDetectionService::new(store);

        let conflicts = service
            .find_conflicts(Subject::Patient(Uuid::new_v4()), at(10, 0), at(10, 30))
            .await
            .unwrap();

        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_find_conflicts_reports_cancelled_but_blocking_skips_them() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let patient_id = Uuid::new_v4();
        let cancelled = seed(&store, Uuid::new_v4(), patient_id, at(10, 0), AppointmentStatus::Cancelled).await;

        let service = ConflictDetectionService::new(store.clone());
        let subject = Subject::Patient(patient_id);

        let all = service.find_conflicts(subject, at(10, 0), at(10, 30)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, cancelled.id);

        let blocking = service.find_blocking(subject, at(10, 0), at(10, 30), None).await.unwrap();
        assert!(blocking.is_empty());
    }

    #[tokio::test]
    async fn test_find_blocking_excludes_given_appointment() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let doctor_id = Uuid::new_v4();
        let existing = seed(&store, doctor_id, Uuid::new_v4(), at(10, 0), AppointmentStatus::Scheduled).await;

        let service = ConflictDetectionService::new(store.clone());
        let subject = Subject::Doctor(doctor_id);
        let window_end = at(10, 0) + Duration::minutes(30);

        assert_eq!(service.find_blocking(subject, at(10, 0), window_end, None).await.unwrap().len(), 1);
        assert!(service
            .find_blocking(subject, at(10, 0), window_end, Some(existing.id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_check_conflicts_reports_each_subject() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let doctor_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        seed(&store, doctor_id, Uuid::new_v4(), at(9, 0), AppointmentStatus::Scheduled).await;

        let service = ConflictDetectionService::new(store.clone());

        let busy = service
            .check_conflicts(&ConflictCheckRequest {
                doctor_id,
                patient_id,
                start_time: at(9, 15),
                exclude_appointment_id: None,
            })
            .await
            .unwrap();
        assert!(busy.has_conflict);
        assert_eq!(busy.doctor_conflicts.len(), 1);
        assert!(busy.patient_conflicts.is_empty());
        assert_eq!(busy.end_time, at(9, 45));

        let free = service
            .check_conflicts(&ConflictCheckRequest {
                doctor_id,
                patient_id,
                start_time: at(9, 30),
                exclude_appointment_id: None,
            })
            .await
            .unwrap();
        assert!(!free.has_conflict);
    }

    #[tokio::test]
    async fn test_check_conflicts_rejects_start_without_room_for_a_slot() {
        let service = ConflictDetectionService::new(Arc::new(InMemoryAppointmentStore::new()));

        let result = service
            .check_conflicts(&ConflictCheckRequest {
                doctor_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                start_time: DateTime::<Utc>::MAX_UTC,
                exclude_appointment_id: None,
            })
            .await;

        assert_eq!(
            result.map(|r| r.has_conflict),
            Err(AppointmentError::validation("start_time", "out of range"))
        );
    }
}
