use curl::easy::{Easy, List};
use url::Url;

use crate::error::CasError;

/// Ephemeral outbound validation message: the full validation URL (query
/// included) plus, for SAML, the SOAP envelope to POST. The method is GET
/// unless a body is present.
#[derive(Clone, Debug)]
pub(crate) struct ValidationRequest {
    pub(crate) url: Url,
    pub(crate) soap_body: Option<String>,
}

/// Performs the validation request and buffers the response body to
/// completion. The scheme (http/https) rides on the validation URL, which
/// inherits it from the SSO base checked at construction. No timeout is
/// imposed beyond libcurl's defaults and no retries are performed.
pub(crate) fn fetch_validation(request: &ValidationRequest) -> Result<String, CasError> {
    debug!("Fetching CAS validation: {}", request.url);

    let mut data = Vec::new();
    let mut handle = Easy::new();
    handle
        .url(request.url.as_str())
        .map_err(CasError::Transport)?;
    if let Some(body) = &request.soap_body {
        handle.post(true).map_err(CasError::Transport)?;
        handle
            .post_fields_copy(body.as_bytes())
            .map_err(CasError::Transport)?;
        // libcurl would otherwise default to form-urlencoded, which CAS
        // servers reject for samlValidate.
        let mut headers = List::new();
        headers
            .append("Content-Type: text/xml")
            .map_err(CasError::Transport)?;
        handle.http_headers(headers).map_err(CasError::Transport)?;
    }
    {
        let mut transfer = handle.transfer();
        transfer
            .write_function(|new_data| {
                data.extend_from_slice(new_data);
                Ok(new_data.len())
            })
            .map_err(CasError::Transport)?;
        transfer.perform().map_err(classify)?;
    }

    String::from_utf8(data).map_err(|_| CasError::BadResponse)
}

/// Could-not-resolve and could-not-connect failures form the distinguished
/// host-unreachable class; everything else (timeouts included) is a generic
/// transport error.
fn classify(err: curl::Error) -> CasError {
    if err.is_couldnt_resolve_host() || err.is_couldnt_resolve_proxy() || err.is_couldnt_connect()
    {
        CasError::Unreachable(err)
    } else {
        CasError::Transport(err)
    }
}
