use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::config::CasConfig;
use crate::error::CasError;
use crate::principal::CasPrincipal;
use crate::protocol::{soap_envelope, ProtocolAdapter, ValidationOutcome};
use crate::request::CasRequest;
use crate::transport::{fetch_validation, ValidationRequest};

/// Context handed to the verify callback on protocol-level success.
///
/// `request` is only populated when the strategy is configured with
/// `pass_request_to_callback`.
#[derive(Clone, Debug)]
pub struct VerifyContext {
    pub principal: CasPrincipal,
    pub request: Option<CasRequest>,
}

/// The verify callback's answer: accept the user (possibly substituting an
/// enriched principal) or reject with optional info. Returning `Err` instead
/// takes the error path ([`CasError::Callback`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Accept {
        user: CasPrincipal,
        info: Option<String>,
    },
    Reject {
        info: Option<String>,
    },
}

/// Terminal decision of one authentication attempt. The host renders it:
/// redirects go to the browser (the host clears its local session before
/// following `RedirectToLogout`), `Authenticated` establishes the session,
/// `Rejected` maps to the host's failure channel.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthDecision {
    RedirectToLogin(String),
    RedirectToLogout(String),
    Authenticated {
        user: CasPrincipal,
        info: Option<String>,
    },
    Rejected {
        info: Option<String>,
    },
}

/// Per-invocation options: extra parameters forwarded verbatim to the SSO
/// login page. Parameters with empty values are omitted entirely.
#[derive(Clone, Debug, Default)]
pub struct AuthenticateOptions {
    pub login_params: Vec<(String, String)>,
}

pub type VerifyError = Box<dyn std::error::Error + Send + Sync>;
type VerifyFn = dyn Fn(VerifyContext) -> Result<Verdict, VerifyError> + Send + Sync;

/// CAS authentication strategy: immutable configuration, the protocol
/// adapter selected from it, and the verify callback. Cheap to clone and
/// shared read-only across concurrently handled requests.
#[derive(Clone)]
pub struct CasStrategy {
    config: CasConfig,
    sso_base_url: Url,
    server_base_url: Url,
    adapter: ProtocolAdapter,
    verify: Arc<VerifyFn>,
}

impl fmt::Debug for CasStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CasStrategy")
            .field("config", &self.config)
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl CasStrategy {
    // ################################################################################
    // Constructor
    // ################################################################################
    /// Builds the strategy, validating the configuration. Both base URLs
    /// must be absolute and the SSO base scheme must be http or https; a bad
    /// configuration fails here, before the strategy is installed.
    pub fn new<F>(config: CasConfig, verify: F) -> Result<Self, CasError>
    where
        F: Fn(VerifyContext) -> Result<Verdict, VerifyError> + Send + Sync + 'static,
    {
        let sso_base_url = parse_base_url(config.sso_base_url(), "sso_base_url")?;
        match sso_base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CasError::Configuration(format!(
                    "unsupported sso_base_url scheme {}",
                    other
                )))
            }
        }
        let server_base_url = parse_base_url(config.server_base_url(), "server_base_url")?;
        let adapter = ProtocolAdapter::select(config.version(), config.use_saml());
        Ok(CasStrategy {
            config,
            sso_base_url,
            server_base_url,
            adapter,
            verify: Arc::new(verify),
        })
    }

    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    // ################################################################################
    // URL builders
    // ################################################################################
    /// Derives the ticket-free service URL for a request: the configured
    /// explicit service URL if any, else the request's own URL, resolved
    /// against the server base, with the `ticket` and `RelayState`
    /// parameters stripped.
    ///
    /// Deterministic and side-effect-free: the CAS server compares the
    /// value sent during the login redirect against the one sent during
    /// validation, so re-deriving it after the SSO round trip must yield a
    /// byte-identical string. Untouched query parameters keep their
    /// original bytes for the same reason.
    pub fn service_url(&self, request: &CasRequest) -> Result<String, CasError> {
        let target = self.config.service_url().unwrap_or_else(|| request.url());
        let resolved = Url::options()
            .base_url(Some(&self.server_base_url))
            .parse(target)
            .map_err(|err| {
                CasError::Configuration(format!("cannot resolve service url: {}", err))
            })?;
        Ok(strip_transient_params(resolved))
    }

    /// SSO login redirect: `<ssoBase>/login?service=<s>` plus each login
    /// parameter with a non-empty value, in the given order.
    pub fn login_url(
        &self,
        service: &str,
        login_params: &[(String, String)],
    ) -> Result<String, CasError> {
        let mut url = Url::parse_with_params(
            &format!("{}login", self.sso_base_url),
            &[("service", service)],
        )
        .map_err(|err| CasError::Configuration(format!("cannot build login url: {}", err)))?;
        for (name, value) in login_params {
            // `service` is fixed by the strategy; a colliding login param
            // would desynchronize the value the CAS server compares at
            // validation time.
            if name == "service" {
                warn!("Ignoring login parameter that collides with service");
                continue;
            }
            if !value.is_empty() {
                url.query_pairs_mut().append_pair(name, value);
            }
        }
        Ok(url.to_string())
    }

    /// Plain SSO logout URL, for app-initiated logout links.
    pub fn logout_url(&self) -> String {
        format!("{}logout", self.sso_base_url)
    }

    /// Front-channel single-logout redirect carrying the relay state back
    /// to the SSO server.
    fn single_logout_url(&self, relay_state: &str) -> Result<String, CasError> {
        let mut url = Url::parse(&format!("{}logout", self.sso_base_url))
            .map_err(|err| CasError::Configuration(format!("cannot build logout url: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("_eventId", "next")
            .append_pair("RelayState", relay_state);
        Ok(url.to_string())
    }

    fn validation_url(&self) -> Result<Url, CasError> {
        match self.config.validate_url() {
            // An explicit override is resolved against the SSO base, so it
            // accepts either a full URL or a path.
            Some(explicit) => Url::options()
                .base_url(Some(&self.sso_base_url))
                .parse(explicit)
                .map_err(|err| {
                    CasError::Configuration(format!("cannot resolve validate url: {}", err))
                }),
            None => Url::parse(&format!("{}{}", self.sso_base_url, self.adapter.validate_path()))
                .map_err(|err| {
                    CasError::Configuration(format!("cannot build validate url: {}", err))
                }),
        }
    }

    fn validation_request(
        &self,
        ticket: &str,
        service: &str,
    ) -> Result<ValidationRequest, CasError> {
        let mut url = self.validation_url()?;
        if self.adapter.uses_saml() {
            url.query_pairs_mut().append_pair("TARGET", service);
            Ok(ValidationRequest {
                url,
                soap_body: Some(soap_envelope(ticket)),
            })
        } else {
            url.query_pairs_mut()
                .append_pair("ticket", ticket)
                .append_pair("service", service);
            Ok(ValidationRequest {
                url,
                soap_body: None,
            })
        }
    }

    // ################################################################################
    // Orchestrator
    // ################################################################################
    /// Runs the per-request state machine: single logout when a relay state
    /// is present, login redirect when no ticket is present, ticket
    /// validation otherwise. Transport failures surface as `Err`; an
    /// explicit denial or unparseable response becomes a `Rejected`
    /// decision without invoking the verify callback.
    pub fn authenticate(
        &self,
        request: &CasRequest,
        options: &AuthenticateOptions,
    ) -> Result<AuthDecision, CasError> {
        if let Some(relay_state) = request.relay_state() {
            debug!("Front-channel single logout, RelayState: {}", relay_state);
            return Ok(AuthDecision::RedirectToLogout(
                self.single_logout_url(relay_state)?,
            ));
        }

        let service = self.service_url(request)?;

        let ticket = match request.ticket() {
            Some(ticket) => ticket,
            None => {
                debug!("No ticket, redirecting to login");
                return Ok(AuthDecision::RedirectToLogin(
                    self.login_url(&service, &options.login_params)?,
                ));
            }
        };

        debug!("Validating service ticket: {}", ticket);
        let validation = self.validation_request(ticket, &service)?;
        let body = fetch_validation(&validation)?;

        match self.adapter.parse(&body) {
            ValidationOutcome::Failure(reason) => {
                let err = CasError::from(reason);
                warn!("Ticket validation failed: {}", err);
                Ok(AuthDecision::Rejected {
                    info: Some(err.to_string()),
                })
            }
            ValidationOutcome::Success(principal) => {
                let context = VerifyContext {
                    principal,
                    request: if self.config.pass_request_to_callback() {
                        Some(request.clone())
                    } else {
                        None
                    },
                };
                match (self.verify)(context) {
                    Err(source) => Err(CasError::Callback(source)),
                    Ok(Verdict::Reject { info }) => Ok(AuthDecision::Rejected { info }),
                    Ok(Verdict::Accept { user, info }) => {
                        Ok(AuthDecision::Authenticated { user, info })
                    }
                }
            }
        }
    }
}

fn parse_base_url(raw: &str, name: &str) -> Result<Url, CasError> {
    // Trailing-slash normalization keeps path concatenation predictable for
    // bases with a path component (e.g. "https://host/cas").
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized)
        .map_err(|err| CasError::Configuration(format!("{} is not a valid url: {}", name, err)))
}

/// Removes the `ticket` and `RelayState` query parameters. Filtering works
/// on raw query segments so every other parameter keeps its original bytes.
fn strip_transient_params(mut url: Url) -> String {
    let filtered: Option<String> = url.query().map(|query| {
        query
            .split('&')
            .filter(|segment| {
                let name = segment.splitn(2, '=').next().unwrap_or("");
                name != "ticket" && name != "RelayState"
            })
            .collect::<Vec<_>>()
            .join("&")
    });
    match filtered {
        Some(query) if !query.is_empty() => url.set_query(Some(&query)),
        _ => url.set_query(None),
    }
    url.to_string()
}
