use url::form_urlencoded;

/// Per-request snapshot consumed by the strategy: the original request URL
/// plus the `ticket` and `RelayState` query parameters extracted from it.
///
/// The URL may be absolute or server-relative; relative URLs are resolved
/// against the configured server base when the service URL is derived.
/// Empty parameter values count as absent, so `?ticket=` falls through to
/// the login redirect instead of a doomed validation call.
#[derive(Clone, Debug, PartialEq)]
pub struct CasRequest {
    url: String,
    ticket: Option<String>,
    relay_state: Option<String>,
}

impl CasRequest {
    pub fn new(url: &str) -> Self {
        let query = url
            .split_once('?')
            .map(|(_, rest)| rest.split('#').next().unwrap_or(""))
            .unwrap_or("");
        let mut ticket = None;
        let mut relay_state = None;
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "ticket" => ticket = Some(value.into_owned()),
                "RelayState" => relay_state = Some(value.into_owned()),
                _ => {}
            }
        }
        CasRequest {
            url: url.to_string(),
            ticket,
            relay_state,
        }
    }

    /// The request's own URL, exactly as the host captured it.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ticket(&self) -> Option<&str> {
        self.ticket.as_deref()
    }

    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ticket_and_relay_state() {
        let request = CasRequest::new("http://app.example.org/cb?ticket=ST-1&RelayState=xyz");
        assert_eq!(request.ticket(), Some("ST-1"));
        assert_eq!(request.relay_state(), Some("xyz"));
        assert_eq!(request.url(), "http://app.example.org/cb?ticket=ST-1&RelayState=xyz");
    }

    #[test]
    fn no_query_means_no_parameters() {
        let request = CasRequest::new("/protected");
        assert_eq!(request.ticket(), None);
        assert_eq!(request.relay_state(), None);
    }

    #[test]
    fn empty_values_count_as_absent() {
        let request = CasRequest::new("/cb?ticket=&RelayState=");
        assert_eq!(request.ticket(), None);
        assert_eq!(request.relay_state(), None);
    }

    #[test]
    fn ticket_value_is_percent_decoded() {
        let request = CasRequest::new("/cb?ticket=ST%2D1%2Dabc");
        assert_eq!(request.ticket(), Some("ST-1-abc"));
    }
}
