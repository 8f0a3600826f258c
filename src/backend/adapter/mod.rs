pub mod local_kds;
pub mod remote_kds;
