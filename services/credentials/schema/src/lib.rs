pub mod otps;
pub mod sessions;
