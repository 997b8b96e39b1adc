pub mod text;
pub mod timezone;
pub mod urls;
pub mod xml;
