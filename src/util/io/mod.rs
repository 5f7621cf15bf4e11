pub mod fields;
pub mod framer;
pub mod records;
pub mod serial;
