pub mod otp;
pub mod session;
