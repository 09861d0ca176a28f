//! Stack settings read from the process environment
//!
//! Every required variable is checked up front so a missing one aborts before any chart is
//! built or any command reaches the cluster.

use crate::domain::Domain;
use crate::error::{CoreError, Result};

pub const DOMAIN: &str = "KSTACK_DOMAIN";
pub const WILDCARD: &str = "KSTACK_WILDCARD";
pub const CERT_EMAIL: &str = "KSTACK_CERT_EMAIL";
pub const ENVIRONMENT: &str = "KSTACK_ENV";
pub const IMAGE_TAG: &str = "KSTACK_IMAGE_TAG";
pub const CLOUDFLARE_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
pub const CLOUDFLARE_ZONE_ID: &str = "CLOUDFLARE_ZONE_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEnv {
    /// Environment discriminator, e.g. `dev` or `prod`
    pub environment: String,
    pub domain: Domain,
    pub cert_email: String,
    pub cloudflare_api_token: String,
    pub cloudflare_zone_id: String,
    pub image_tag: String,
}

impl StackEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CoreError::MissingEnv {
                    name: name.to_string(),
                })
        };

        let wildcard = match lookup(WILDCARD).as_deref() {
            None | Some("") => true,
            Some(v) => parse_bool(v).ok_or_else(|| CoreError::InvalidValue {
                key: WILDCARD.to_string(),
                message: format!("expected a boolean, got '{}'", v),
            })?,
        };

        Ok(Self {
            domain: Domain::new(required(DOMAIN)?, wildcard),
            cert_email: required(CERT_EMAIL)?,
            cloudflare_api_token: required(CLOUDFLARE_API_TOKEN)?,
            cloudflare_zone_id: required(CLOUDFLARE_ZONE_ID)?,
            environment: required(ENVIRONMENT)?,
            image_tag: lookup(IMAGE_TAG)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "latest".to_string()),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (DOMAIN, "example.com".to_string()),
            (CERT_EMAIL, "ops@example.com".to_string()),
            (CLOUDFLARE_API_TOKEN, "token".to_string()),
            (CLOUDFLARE_ZONE_ID, "zone".to_string()),
            (ENVIRONMENT, "dev".to_string()),
        ])
    }

    #[test]
    fn test_from_lookup() {
        let vars = full_env();
        let env = StackEnv::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(env.environment, "dev");
        assert_eq!(env.domain, Domain::new("example.com", true));
        assert_eq!(env.image_tag, "latest");
    }

    #[test]
    fn test_missing_required_variable() {
        let mut vars = full_env();
        vars.remove(CLOUDFLARE_ZONE_ID);

        let err = StackEnv::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, CoreError::MissingEnv { ref name } if name == CLOUDFLARE_ZONE_ID));
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_variable_counts_as_missing() {
        let mut vars = full_env();
        vars.insert(ENVIRONMENT, String::new());

        let err = StackEnv::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(err.to_string(), "KSTACK_ENV not defined in process env");
    }

    #[test]
    fn test_wildcard_flag() {
        let mut vars = full_env();
        vars.insert(WILDCARD, "false".to_string());
        let env = StackEnv::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert!(!env.domain.is_wildcard());

        vars.insert(WILDCARD, "maybe".to_string());
        assert!(StackEnv::from_lookup(|k| vars.get(k).cloned()).is_err());
    }
}
