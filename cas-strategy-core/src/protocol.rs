use chrono::{SecondsFormat, Utc};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::CasVersion;
use crate::principal::CasPrincipal;

/// Result of decoding one validation response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationOutcome {
    Success(CasPrincipal),
    Failure(FailureReason),
}

/// Classified validation failure: an explicit denial from the server
/// (possibly carrying its failure code) or a body this client could not
/// make sense of.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureReason {
    Rejected { code: Option<String> },
    BadResponse,
}

/// The three mutually exclusive protocol behaviors, selected once when the
/// strategy is built. Each variant carries its validation endpoint path and
/// its response parser; the parsers are total functions and never panic past
/// this boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ProtocolAdapter {
    Cas1,
    Cas3Xml,
    Cas3Saml,
}

impl ProtocolAdapter {
    /// The SAML flag only applies to CAS 3.0; for CAS 1.0 a set flag is
    /// ignored with a warning rather than rejected.
    pub(crate) fn select(version: CasVersion, use_saml: bool) -> Self {
        match version {
            CasVersion::Cas1_0 => {
                if use_saml {
                    warn!("SAML validation is only available for CAS3.0, ignoring use_saml");
                }
                ProtocolAdapter::Cas1
            }
            CasVersion::Cas3_0 if use_saml => ProtocolAdapter::Cas3Saml,
            CasVersion::Cas3_0 => ProtocolAdapter::Cas3Xml,
        }
    }

    /// Default validation endpoint path, attached onto the SSO base URL.
    pub(crate) fn validate_path(&self) -> &'static str {
        match self {
            ProtocolAdapter::Cas1 => "validate",
            ProtocolAdapter::Cas3Xml => "p3/serviceValidate",
            ProtocolAdapter::Cas3Saml => "samlValidate",
        }
    }

    /// SAML validation POSTs a SOAP envelope instead of a plain GET.
    pub(crate) fn uses_saml(&self) -> bool {
        matches!(self, ProtocolAdapter::Cas3Saml)
    }

    pub(crate) fn parse(&self, body: &str) -> ValidationOutcome {
        match self {
            ProtocolAdapter::Cas1 => parse_cas1(body),
            ProtocolAdapter::Cas3Xml => parse_cas3(body),
            ProtocolAdapter::Cas3Saml => parse_saml(body),
        }
    }
}

// ################################################################################
// CAS 1.0 plain-text line protocol
// ################################################################################
// "yes\n<principal>" or "no"; anything else is a bad response. `lines()`
// strips stray carriage returns, so CRLF bodies parse too.
fn parse_cas1(body: &str) -> ValidationOutcome {
    let mut lines = body.lines();
    match lines.next() {
        Some("no") => ValidationOutcome::Failure(FailureReason::Rejected { code: None }),
        Some("yes") => match lines.next() {
            Some(principal) if !principal.is_empty() => {
                ValidationOutcome::Success(CasPrincipal::new(principal, None))
            }
            _ => ValidationOutcome::Failure(FailureReason::BadResponse),
        },
        _ => ValidationOutcome::Failure(FailureReason::BadResponse),
    }
}

// ################################################################################
// CAS 3.0 XML service response
// ################################################################################
fn parse_cas3(body: &str) -> ValidationOutcome {
    let document = match Document::parse(body) {
        Ok(document) => document,
        Err(err) => {
            debug!("Unparseable service response: {}", err);
            return ValidationOutcome::Failure(FailureReason::BadResponse);
        }
    };
    let root = document.root_element();

    if let Some(failure) = find_descendant(root, "authenticationFailure") {
        let code = failure.attribute("code").map(|c| c.trim().to_string());
        return ValidationOutcome::Failure(FailureReason::Rejected { code });
    }

    let success = match find_descendant(root, "authenticationSuccess") {
        Some(success) => success,
        None => return ValidationOutcome::Failure(FailureReason::BadResponse),
    };
    let username = match find_child(success, "user").and_then(element_text) {
        Some(username) => username,
        None => return ValidationOutcome::Failure(FailureReason::BadResponse),
    };

    let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(container) = find_child(success, "attributes") {
        for attribute in container.children().filter(Node::is_element) {
            if let Some(value) = element_text(attribute) {
                attributes
                    .entry(attribute.tag_name().name().to_lowercase())
                    .or_default()
                    .push(value);
            }
        }
    }

    ValidationOutcome::Success(CasPrincipal::new(&username, Some(attributes)))
}

// ################################################################################
// CAS 3.0 SAML 1.1 response
// ################################################################################
fn parse_saml(body: &str) -> ValidationOutcome {
    let document = match Document::parse(body) {
        Ok(document) => document,
        Err(err) => {
            debug!("Unparseable SAML response: {}", err);
            return ValidationOutcome::Failure(FailureReason::BadResponse);
        }
    };
    // Any missing structural node fails closed to BadResponse; only an
    // explicit non-Success status is a rejection.
    saml_outcome(&document).unwrap_or(ValidationOutcome::Failure(FailureReason::BadResponse))
}

fn saml_outcome(document: &Document) -> Option<ValidationOutcome> {
    let envelope = document.root_element();
    let response = find_child(find_child(envelope, "Body")?, "Response")?;

    let status_code = find_child(find_child(response, "Status")?, "StatusCode")?;
    let status_value = status_code.attribute("Value")?;
    // CAS status codes are namespaced (e.g. "samlp:Success"), so only the
    // suffix is compared, case-sensitively.
    if !status_value.ends_with("Success") {
        return Some(ValidationOutcome::Failure(FailureReason::Rejected {
            code: Some(status_value.to_string()),
        }));
    }

    let assertion = find_child(response, "Assertion")?;
    let subject = find_child(
        find_child(assertion, "AuthenticationStatement")?,
        "Subject",
    )?;
    let username = find_child(subject, "NameIdentifier").and_then(element_text)?;

    let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(statement) = find_child(assertion, "AttributeStatement") {
        for attribute in statement
            .children()
            .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("Attribute"))
        {
            let name = match attribute.attribute("AttributeName") {
                Some(name) => name.to_lowercase(),
                None => continue,
            };
            let values = attribute
                .children()
                .filter(|n| {
                    n.is_element() && n.tag_name().name().eq_ignore_ascii_case("AttributeValue")
                })
                .filter_map(element_text);
            attributes.entry(name).or_default().extend(values);
        }
    }

    Some(ValidationOutcome::Success(CasPrincipal::new(
        &username,
        Some(attributes),
    )))
}

// ################################################################################
// XML navigation helpers
// ################################################################################
// Lookup is by local name, compared case-insensitively, so namespace
// prefixes and case variations do not affect navigation.
fn find_child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case(name))
}

fn find_descendant<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case(name))
}

fn element_text(node: Node) -> Option<String> {
    let text = node.text().map(str::trim).unwrap_or("");
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

// ################################################################################
// SAML request envelope
// ################################################################################
/// Builds the SOAP 1.1 envelope POSTed to `samlValidate`, with a fresh
/// random request identifier, the current UTC instant, and the ticket as
/// the assertion artifact.
pub(crate) fn soap_envelope(ticket: &str) -> String {
    let request_id = Uuid::new_v4();
    let issue_instant = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    format!(
        "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <SOAP-ENV:Header/><SOAP-ENV:Body>\
         <samlp:Request xmlns:samlp=\"urn:oasis:names:tc:SAML:1.0:protocol\" \
         MajorVersion=\"1\" MinorVersion=\"1\" \
         RequestID=\"{}\" IssueInstant=\"{}\">\
         <samlp:AssertionArtifact>{}</samlp:AssertionArtifact>\
         </samlp:Request></SOAP-ENV:Body></SOAP-ENV:Envelope>",
        request_id,
        issue_instant,
        xml_escape(ticket)
    )
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
