use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized authenticated principal extracted from a validation response.
///
/// CAS 3.0 attribute schemas vary by server and a single attribute name may
/// carry several values, so attributes map a name to one-or-many values.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CasPrincipal {
    username: String,
    attributes: HashMap<String, Vec<String>>,
}

impl CasPrincipal {
    // ################################################################################
    // Constructor
    // ################################################################################
    //
    /// Returns a new CAS principal
    ///
    /// # Examples
    ///
    /// - Without attributes:
    /// ```
    /// use cas_strategy_core::CasPrincipal;
    /// use std::collections::HashMap;
    ///
    /// let principal = CasPrincipal::new("user", None);
    /// assert_eq!(principal.username(), "user");
    /// assert_eq!(principal.attributes(), &HashMap::new());
    /// ```
    ///
    /// - With attributes:
    /// ```
    /// use cas_strategy_core::CasPrincipal;
    /// use std::collections::HashMap;
    ///
    /// let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
    /// attributes.insert("email".to_string(), vec!["user@example.org".to_string()]);
    /// let principal = CasPrincipal::new("user", Some(attributes.clone()));
    /// assert_eq!(principal.username(), "user");
    /// assert_eq!(principal.attributes(), &attributes);
    /// ```
    pub fn new(username: &str, attributes: Option<HashMap<String, Vec<String>>>) -> CasPrincipal {
        debug!(
            "New CAS principal : {{ username: {}, attributes: {:?} }}",
            username, attributes
        );
        CasPrincipal {
            username: username.to_string(),
            attributes: attributes.unwrap_or_default(),
        }
    }

    // ################################################################################
    // Instance functions
    // ################################################################################
    //
    /// Get the principal's username
    ///
    /// # Examples
    /// ```
    /// use cas_strategy_core::CasPrincipal;
    ///
    /// let principal = CasPrincipal::new("user", None);
    /// assert_eq!(principal.username(), "user");
    /// ```
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Get the principal's attributes
    pub fn attributes(&self) -> &HashMap<String, Vec<String>> {
        &self.attributes
    }

    /// Serializes the principal to a JSON string, e.g. for session storage
    ///
    /// # Examples
    /// ```
    /// use cas_strategy_core::CasPrincipal;
    ///
    /// let principal = CasPrincipal::new("user", None);
    /// assert_eq!(
    ///     principal.to_raw().unwrap(),
    ///     "{\"username\":\"user\",\"attributes\":{}}"
    /// );
    /// ```
    pub fn to_raw(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    // ################################################################################
    // Class functions
    // ################################################################################
    //
    /// Deserializes a principal from its JSON form
    ///
    /// # Examples
    /// ```
    /// use cas_strategy_core::CasPrincipal;
    ///
    /// let principal = CasPrincipal::from_raw("{\"username\":\"user\",\"attributes\":{}}").unwrap();
    /// assert_eq!(principal, CasPrincipal::new("user", None));
    /// ```
    pub fn from_raw(raw: &str) -> Result<Self, serde_json::Error> {
        debug!("CAS principal from raw: {}", raw);
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_multi_valued_attributes() {
        let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
        attributes.insert(
            "memberof".to_string(),
            vec!["staff".to_string(), "admins".to_string()],
        );
        let principal = CasPrincipal::new("alice", Some(attributes));

        let raw = principal.to_raw().unwrap();
        assert_eq!(CasPrincipal::from_raw(&raw).unwrap(), principal);
    }

    #[test]
    fn from_raw_rejects_garbage() {
        assert!(CasPrincipal::from_raw("not json").is_err());
    }
}
