pub mod check;
pub mod crisis;
pub mod flags;
pub mod init;
pub mod keygen;
pub mod misc;
pub mod sessions;
