//! Password digest for the ERP login endpoint.
//!
//! The ERP's `/users/login` endpoint only accepts the lowercase hex MD5 of
//! the password. MD5 is broken for password storage; this function exists
//! solely to talk to that endpoint and must never be used for credentials
//! this service stores or verifies itself.

use md5::{Digest, Md5};

/// Lowercase hex MD5 of the UTF-8 password, as the ERP login expects.
pub fn erp_password_hash(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}
