pub mod eui64;
pub mod io;
pub mod log;
