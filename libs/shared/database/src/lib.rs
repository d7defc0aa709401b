pub mod change_bus;
pub mod directory;
pub mod state;
pub mod store;
pub mod supabase;

pub use change_bus::{ChangeBus, ChangeNotice, ChangeSubscription};
pub use directory::{PatientDirectory, StorePatientDirectory, SupabasePatientDirectory};
pub use state::AppState;
pub use store::{
    get_record, list_records, put_record, to_value, MemoryRecordStore, RecordStore,
    RedisRecordStore, StoreError,
};
