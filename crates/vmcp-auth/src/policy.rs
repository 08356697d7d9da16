//! Static auth policies: bearer, API key, basic, and custom headers (spec
//! §4.1 Auth). OAuth2 is handled separately in [`crate::oauth2`] since it
//! is stateful (access/refresh tokens).

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

#[derive(Clone)]
pub enum AuthPolicy {
    None,
    Bearer(SecretString),
    ApiKey {
        header_name: String,
        value: SecretString,
    },
    Basic {
        username: String,
        password: SecretString,
    },
    CustomHeaders(HashMap<String, SecretString>),
    OAuth2,
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bearer(_) => write!(f, "Bearer(<redacted>)"),
            Self::ApiKey { header_name, .. } => {
                write!(f, "ApiKey {{ header_name: {header_name:?}, value: <redacted> }}")
            }
            Self::Basic { username, .. } => {
                write!(f, "Basic {{ username: {username:?}, password: <redacted> }}")
            }
            Self::CustomHeaders(map) => {
                write!(f, "CustomHeaders({:?})", map.keys().collect::<Vec<_>>())
            }
            Self::OAuth2 => write!(f, "OAuth2"),
        }
    }
}

impl AuthPolicy {
    /// Static headers this policy contributes to a request. OAuth2 is
    /// excluded here — its bearer header depends on live token state held
    /// by an [`crate::oauth2::OAuth2Session`].
    pub fn static_headers(&self) -> Vec<(String, String)> {
        match self {
            Self::None | Self::OAuth2 => Vec::new(),
            Self::Bearer(token) => vec![(
                "authorization".to_string(),
                format!("Bearer {}", token.expose_secret()),
            )],
            Self::ApiKey { header_name, value } => {
                vec![(header_name.clone(), value.expose_secret().to_string())]
            }
            Self::Basic { username, password } => {
                let raw = format!("{username}:{}", password.expose_secret());
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                vec![("authorization".to_string(), format!("Basic {encoded}"))]
            }
            Self::CustomHeaders(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
                .collect(),
        }
    }
}
