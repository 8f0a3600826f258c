use crate::models::common::Timestamp;

/// Returns the current Internet Computer time as nanoseconds since epoch.
/// Only callable inside a canister; services take `now` as a parameter.
pub fn get_current_time_ns() -> Timestamp {
    ic_cdk::api::time()
}
