pub mod error;
pub mod formatter;
pub mod protocol;
pub mod text;
