use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CasError;

/// Supported CAS protocol versions.
///
/// The wire names ("CAS1.0", "CAS3.0") are used for both serde and
/// [`FromStr`]; any other string is a configuration error, raised when the
/// configuration is parsed rather than at request time.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CasVersion {
    #[serde(rename = "CAS1.0")]
    Cas1_0,
    #[serde(rename = "CAS3.0")]
    Cas3_0,
}

impl Default for CasVersion {
    fn default() -> Self {
        CasVersion::Cas1_0
    }
}

impl FromStr for CasVersion {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CAS1.0" => Ok(CasVersion::Cas1_0),
            "CAS3.0" => Ok(CasVersion::Cas3_0),
            other => Err(CasError::Configuration(format!(
                "unsupported version {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CasVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasVersion::Cas1_0 => write!(f, "CAS1.0"),
            CasVersion::Cas3_0 => write!(f, "CAS3.0"),
        }
    }
}

/// Immutable strategy configuration, captured once at startup.
///
/// URL invariants (absolute base URLs, http/https SSO scheme) are checked
/// when the strategy is built, so a bad configuration never reaches request
/// time.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CasConfig {
    version: CasVersion,
    use_saml: bool,
    sso_base_url: String,
    server_base_url: String,
    validate_url: Option<String>,
    service_url: Option<String>,
    pass_request_to_callback: bool,
}

impl CasConfig {
    // ################################################################################
    // Constructor
    // ################################################################################
    pub fn new(sso_base_url: &str, server_base_url: &str) -> Self {
        CasConfig {
            version: CasVersion::default(),
            use_saml: false,
            sso_base_url: sso_base_url.to_string(),
            server_base_url: server_base_url.to_string(),
            validate_url: None,
            service_url: None,
            pass_request_to_callback: false,
        }
    }

    // ################################################################################
    // Getters / Setters
    // ################################################################################
    // Protocol version
    pub fn version(&self) -> CasVersion {
        self.version
    }

    pub fn set_version(&mut self, version: CasVersion) -> &mut Self {
        self.version = version;
        self
    }

    // SAML flag
    pub fn use_saml(&self) -> bool {
        self.use_saml
    }

    pub fn set_use_saml(&mut self, use_saml: bool) -> &mut Self {
        self.use_saml = use_saml;
        self
    }

    // SSO base url
    pub fn sso_base_url(&self) -> &str {
        &self.sso_base_url
    }

    pub fn set_sso_base_url(&mut self, sso_base_url: &str) -> &mut Self {
        self.sso_base_url = sso_base_url.to_string();
        self
    }

    // Server base url
    pub fn server_base_url(&self) -> &str {
        &self.server_base_url
    }

    pub fn set_server_base_url(&mut self, server_base_url: &str) -> &mut Self {
        self.server_base_url = server_base_url.to_string();
        self
    }

    // Validate url override
    pub fn validate_url(&self) -> Option<&str> {
        self.validate_url.as_deref()
    }

    /// Replaces the computed validation endpoint. Accepts either a full URL
    /// or a path, resolved against the SSO base.
    pub fn set_validate_url(&mut self, validate_url: &str) -> &mut Self {
        self.validate_url = Some(validate_url.to_string());
        self
    }

    // Service url override
    pub fn service_url(&self) -> Option<&str> {
        self.service_url.as_deref()
    }

    pub fn set_service_url(&mut self, service_url: &str) -> &mut Self {
        self.service_url = Some(service_url.to_string());
        self
    }

    // Pass-request-to-callback flag
    pub fn pass_request_to_callback(&self) -> bool {
        self.pass_request_to_callback
    }

    pub fn set_pass_request_to_callback(&mut self, pass: bool) -> &mut Self {
        self.pass_request_to_callback = pass;
        self
    }
}
