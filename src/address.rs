//! Dotted call addresses (`package.Service.method`).
//!
//! The remote-procedure client names packages and methods in lower camel
//! case while services keep their declared name, so the host resolves an
//! address by lowercasing the first letter of the outer two segments.

use std::fmt;

use crate::{Result, RpcError};

/// Lowercase the first character of `s`, leaving the rest untouched.
pub fn set_first_letter_lowercase(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A validated three-segment call address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodAddress {
    pub package: String,
    pub service: String,
    pub method: String,
}

impl MethodAddress {
    /// Parse `package.Service.method`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::AddressFormat`] unless `address` splits into
    /// exactly three dot-separated segments.
    pub fn parse(address: &str) -> Result<Self> {
        // ---
        let segments: Vec<&str> = address.split('.').collect();

        match segments.as_slice() {
            [package, service, method] => Ok(Self {
                package: package.to_string(),
                service: service.to_string(),
                method: method.to_string(),
            }),
            _ => Err(RpcError::AddressFormat(address.to_string())),
        }
    }

    /// The address as the remote-procedure client names it.
    pub fn resolved(&self) -> Self {
        Self {
            package: set_first_letter_lowercase(&self.package),
            service: self.service.clone(),
            method: set_first_letter_lowercase(&self.method),
        }
    }
}

impl fmt::Display for MethodAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.package, self.service, self.method)
    }
}
