//! Binding configuration read from the environment.
//!
//! - `MXS_INVALID_OP_POLICY`: `abort` (default) or `skip`. What to do when an
//!   operator's metadata cannot be classified.
//! - `MXS_ENFORCE_CPP`: require the engine built against the external C++
//!   library; fail instead of falling back to the native engine.

use std::env;

use crate::{MxsError, Result};

pub const INVALID_OP_POLICY_VAR: &str = "MXS_INVALID_OP_POLICY";
pub const ENFORCE_CPP_VAR: &str = "MXS_ENFORCE_CPP";

/// Handling of operators whose signature fails classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Fail the whole registry walk; a malformed registry means the bindings
    /// and the engine disagree.
    #[default]
    Abort,
    /// Log the operator and leave it out of the namespace.
    Skip,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingConfig {
    pub signature_policy: SignaturePolicy,
    pub enforce_cpp: bool,
}

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

impl BindingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let signature_policy = match lookup(INVALID_OP_POLICY_VAR) {
            Some(value) if !value.trim().is_empty() => {
                match value.trim().to_ascii_lowercase().as_str() {
                    "abort" => SignaturePolicy::Abort,
                    "skip" => SignaturePolicy::Skip,
                    other => {
                        return Err(MxsError::ImportConfiguration(format!(
                            "{INVALID_OP_POLICY_VAR} must be `abort` or `skip`, got `{other}`"
                        )));
                    }
                }
            }
            _ => SignaturePolicy::default(),
        };
        let enforce_cpp = lookup(ENFORCE_CPP_VAR).is_some_and(|v| parse_bool(&v));
        Ok(Self {
            signature_policy,
            enforce_cpp,
        })
    }
}
