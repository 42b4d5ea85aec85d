pub mod models;
pub mod services;

pub use models::*;
pub use services::booking::AppointmentSchedulingService;
pub use services::directory::ClinicDirectoryService;
pub use services::lifecycle::AppointmentLifecycleApi;
pub use services::store::{AppointmentStore, InMemoryAppointmentStore};
pub use services::supabase_store::SupabaseAppointmentStore;
