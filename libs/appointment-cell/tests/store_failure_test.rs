use std::sync::Arc;

use anyhow::anyhow;
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, DoctorRequest, EntityKind, NewAppointment, Subject,
};
use appointment_cell::{AppointmentSchedulingService, AppointmentStore};
use shared_models::entities::{Doctor, Patient};
use shared_utils::test_utils::TestClinic;

mock! {
    pub Store {}

    #[async_trait]
    impl AppointmentStore for Store {
        async fn find_doctor(&self, id: Uuid) -> anyhow::Result<Option<Doctor>>;
        async fn find_doctor_by_email(&self, email: &str) -> anyhow::Result<Option<Doctor>>;
        async fn list_doctors(&self) -> anyhow::Result<Vec<Doctor>>;
        async fn insert_doctor(&self, doctor: Doctor) -> anyhow::Result<Doctor>;
        async fn save_doctor(&self, doctor: Doctor) -> anyhow::Result<Doctor>;
        async fn delete_doctor(&self, id: Uuid) -> anyhow::Result<bool>;
        async fn find_patient(&self, id: Uuid) -> anyhow::Result<Option<Patient>>;
        async fn find_patient_by_email(&self, email: &str) -> anyhow::Result<Option<Patient>>;
        async fn list_patients(&self) -> anyhow::Result<Vec<Patient>>;
        async fn insert_patient(&self, patient: Patient) -> anyhow::Result<Patient>;
        async fn save_patient(&self, patient: Patient) -> anyhow::Result<Patient>;
        async fn delete_patient(&self, id: Uuid) -> anyhow::Result<bool>;
        async fn insert_appointment(&self, appointment: NewAppointment) -> anyhow::Result<Appointment>;
        async fn save_appointment(&self, appointment: Appointment) -> anyhow::Result<Appointment>;
        async fn find_appointment(&self, id: Uuid) -> anyhow::Result<Option<Appointment>>;
        async fn delete_appointment(&self, id: Uuid) -> anyhow::Result<bool>;
        async fn list_by_doctor(&self, doctor_id: Uuid) -> anyhow::Result<Vec<Appointment>>;
        async fn list_by_patient(&self, patient_id: Uuid) -> anyhow::Result<Vec<Appointment>>;
        async fn list_appointments(&self) -> anyhow::Result<Vec<Appointment>>;
        async fn list_starting_between(
            &self,
            subject: Subject,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> anyhow::Result<Vec<Appointment>>;
    }
}

fn service(store: MockStore) -> AppointmentSchedulingService {
    AppointmentSchedulingService::new(Arc::new(store))
}

#[tokio::test]
async fn test_missing_doctor_short_circuits_before_any_conflict_query() {
    let mut store = MockStore::new();
    store.expect_find_doctor().times(1).returning(|_| Ok(None));
    store.expect_find_patient().never();
    store.expect_list_starting_between().never();
    store.expect_insert_appointment().never();

    let doctor_id = Uuid::new_v4();
    let result = service(store)
        .create_appointment(doctor_id, Uuid::new_v4(), TestClinic::at(9, 0), None)
        .await;

    assert_eq!(result, Err(AppointmentError::NotFound { kind: EntityKind::Doctor, id: doctor_id }));
}

#[tokio::test]
async fn test_missing_patient_short_circuits_before_any_conflict_query() {
    let mut store = MockStore::new();
    store
        .expect_find_doctor()
        .returning(|_| Ok(Some(TestClinic::doctor("House"))));
    store.expect_find_patient().times(1).returning(|_| Ok(None));
    store.expect_list_starting_between().never();
    store.expect_insert_appointment().never();

    let patient_id = Uuid::new_v4();
    let result = service(store)
        .create_appointment(Uuid::new_v4(), patient_id, TestClinic::at(9, 0), None)
        .await;

    assert_eq!(result, Err(AppointmentError::NotFound { kind: EntityKind::Patient, id: patient_id }));
}

#[tokio::test]
async fn test_conflict_query_failure_surfaces_as_database_error() {
    let mut store = MockStore::new();
    store
        .expect_find_doctor()
        .returning(|_| Ok(Some(TestClinic::doctor("House"))));
    store
        .expect_find_patient()
        .returning(|_| Ok(Some(TestClinic::patient("Ana"))));
    store
        .expect_list_starting_between()
        .returning(|_, _, _| Err(anyhow!("connection reset")));
    store.expect_insert_appointment().never();

    let result = service(store)
        .create_appointment(Uuid::new_v4(), Uuid::new_v4(), TestClinic::at(9, 0), None)
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(ref message)) if message.contains("connection reset"));
}

#[tokio::test]
async fn test_failed_insert_surfaces_as_database_error() {
    let mut store = MockStore::new();
    store
        .expect_find_doctor()
        .returning(|_| Ok(Some(TestClinic::doctor("House"))));
    store
        .expect_find_patient()
        .returning(|_| Ok(Some(TestClinic::patient("Ana"))));
    store
        .expect_list_starting_between()
        .times(2)
        .returning(|_, _, _| Ok(Vec::new()));
    store
        .expect_insert_appointment()
        .times(1)
        .returning(|_| Err(anyhow!("unique violation")));

    let result = service(store)
        .create_appointment(Uuid::new_v4(), Uuid::new_v4(), TestClinic::at(9, 0), None)
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
}

#[tokio::test]
async fn test_conflict_window_queries_one_duration_back() {
    let mut store = MockStore::new();
    store
        .expect_find_doctor()
        .returning(|_| Ok(Some(TestClinic::doctor("House"))));
    store
        .expect_find_patient()
        .returning(|_| Ok(Some(TestClinic::patient("Ana"))));
    store
        .expect_list_starting_between()
        .withf(|_, from, to| *from == TestClinic::at(9, 30) && *to == TestClinic::at(10, 30))
        .times(2)
        .returning(|_, _, _| Ok(Vec::new()));
    store
        .expect_insert_appointment()
        .returning(|draft| Ok(draft.into_appointment(Uuid::new_v4(), Utc::now())));

    let booked = service(store)
        .create_appointment(Uuid::new_v4(), Uuid::new_v4(), TestClinic::at(10, 0), None)
        .await
        .unwrap();

    assert_eq!(booked.start_time, TestClinic::at(10, 0));
}

#[tokio::test]
async fn test_start_without_room_for_a_slot_is_rejected_before_any_lookup() {
    let mut store = MockStore::new();
    store.expect_find_doctor().never();
    store.expect_list_starting_between().never();

    let result = service(store)
        .create_appointment(Uuid::new_v4(), Uuid::new_v4(), DateTime::<Utc>::MAX_UTC, None)
        .await;

    assert_eq!(result, Err(AppointmentError::validation("start_time", "out of range")));
}

#[tokio::test]
async fn test_directory_store_failure_is_database_error() {
    let mut store = MockStore::new();
    store
        .expect_find_doctor_by_email()
        .returning(|_| Err(anyhow!("connection refused")));
    store.expect_insert_doctor().never();

    let result = service(store)
        .directory()
        .create_doctor(DoctorRequest {
            first_name: "Gregory".to_string(),
            last_name: "House".to_string(),
            specialization: None,
            email: Some("house@example.com".to_string()),
        })
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
}

#[tokio::test]
async fn test_lookup_failure_on_get_is_database_error() {
    let mut store = MockStore::new();
    store
        .expect_find_appointment()
        .returning(|_| Err(anyhow!("timeout")));

    let result = service(store).get_appointment(Uuid::new_v4()).await;
    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
}
