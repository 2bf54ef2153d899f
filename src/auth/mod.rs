pub mod claims;
pub mod cookies;
pub(crate) mod extractors;
pub mod jwt;
pub mod password;
