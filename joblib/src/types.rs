use num_bigint::BigUint;

pub type Program = String;
pub type Args = Vec<String>;
pub type JobId = String;
pub type Owner = BigUint;
pub type OutputBlob = bytes::Bytes;

/// Generate a fresh random job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}
