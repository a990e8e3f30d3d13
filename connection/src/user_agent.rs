//! User agent advertised in outbound version messages.
//!
//! Agents follow Bitcoin Core's `/name:version/` convention. Agents received
//! from peers are not validated, they are reported verbatim.

use std::fmt;

/// Errors that can occur during user agent validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentError {
    /// The user agent format is invalid (must be `/name:version/`).
    InvalidFormat,
    /// The name component is missing or empty.
    MissingName,
    /// The version component is missing or empty.
    MissingVersion,
}

impl fmt::Display for UserAgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAgentError::InvalidFormat => {
                write!(f, "User agent must follow format '/name:version/'")
            }
            UserAgentError::MissingName => {
                write!(f, "User agent name component cannot be empty")
            }
            UserAgentError::MissingVersion => {
                write!(f, "User agent version component cannot be empty")
            }
        }
    }
}

impl std::error::Error for UserAgentError {}

/// A validated `/name:version/` user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent(String);

impl UserAgent {
    /// Validate and wrap a user agent string.
    ///
    /// # Example
    ///
    /// ```
    /// use bitcoin_seeder_connection::UserAgent;
    ///
    /// assert!(UserAgent::new("/bitcoin-seeder:0.1.0/").is_ok());
    /// assert!(UserAgent::new("bitcoin-seeder:0.1.0").is_err());
    /// ```
    pub fn new<S: Into<String>>(user_agent: S) -> Result<Self, UserAgentError> {
        let user_agent = user_agent.into();
        let contents = user_agent
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or(UserAgentError::InvalidFormat)?;

        let (name, version) = contents
            .split_once(':')
            .ok_or(UserAgentError::InvalidFormat)?;
        if version.contains(':') {
            return Err(UserAgentError::InvalidFormat);
        }
        if name.is_empty() {
            return Err(UserAgentError::MissingName);
        }
        if version.is_empty() {
            return Err(UserAgentError::MissingVersion);
        }

        Ok(UserAgent(user_agent))
    }

    /// Build an agent from its components, e.g. `/bitcoin-seeder:0.1.0/`.
    pub fn from_name_version(name: &str, version: &str) -> Self {
        UserAgent(format!("/{name}:{version}/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_user_agents() {
        assert!(UserAgent::new("/bitcoin-seeder:0.1.0/").is_ok());
        assert!(UserAgent::new("/Bitcoin Core:26.0.0/").is_ok());
        assert!(UserAgent::new("/Satoshi:0.14.2/").is_ok());
    }

    #[test]
    fn test_invalid_user_agents() {
        assert_eq!(
            UserAgent::new("bitcoin-seeder:0.1.0/"),
            Err(UserAgentError::InvalidFormat)
        );
        assert_eq!(
            UserAgent::new("/bitcoin-seeder:0.1.0"),
            Err(UserAgentError::InvalidFormat)
        );
        assert_eq!(
            UserAgent::new("/bitcoin-seeder/"),
            Err(UserAgentError::InvalidFormat)
        );
        assert_eq!(
            UserAgent::new("/bitcoin:seeder:0.1.0/"),
            Err(UserAgentError::InvalidFormat)
        );
        assert_eq!(UserAgent::new("/:0.1.0/"), Err(UserAgentError::MissingName));
        assert_eq!(
            UserAgent::new("/bitcoin-seeder:/"),
            Err(UserAgentError::MissingVersion)
        );
        // A lone slash has no room for contents.
        assert_eq!(UserAgent::new("/"), Err(UserAgentError::InvalidFormat));
    }

    #[test]
    fn test_from_name_version_is_valid() {
        let user_agent = UserAgent::from_name_version("bitcoin-seeder", "0.1.0");
        assert_eq!(user_agent.as_str(), "/bitcoin-seeder:0.1.0/");
        assert!(UserAgent::new(user_agent.as_str()).is_ok());
    }
}
