//! OIDC wire types and the credential material read from the client Secret

use crate::http::HttpAuth;
use crate::store::secret_value;
use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;

/// Secret data key holding the registered client id
pub const CLIENT_ID_KEY: &str = "client_id";
/// Secret data key holding the registered client secret
pub const CLIENT_SECRET_KEY: &str = "client_secret";
/// `true` (case-insensitive) disables certificate verification
pub const INSECURE_TLS_KEY: &str = "insecureTLS";
pub const BASIC_AUTH_USERNAME_KEY: &str = "baUsername";
pub const BASIC_AUTH_PASSWORD_KEY: &str = "baPassword";
pub const INITIAL_ACCESS_TOKEN_KEY: &str = "initialAccessToken";
pub const TOKEN_RETRIEVAL_CLIENT_ID_KEY: &str = "tokenRetrievalClientId";
pub const TOKEN_RETRIEVAL_CLIENT_SECRET_KEY: &str = "tokenRetrievalClientSecret";

/// Credential material of one OIDC registration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OidcCredential {
    pub secret_name: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub insecure_tls: bool,
    pub basic_auth_username: Option<String>,
    pub basic_auth_password: Option<String>,
    pub initial_access_token: Option<String>,
    pub token_retrieval_client_id: Option<String>,
    pub token_retrieval_client_secret: Option<String>,
}

impl std::fmt::Debug for OidcCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcCredential")
            .field("secret_name", &self.secret_name)
            .field("client_id", &self.client_id)
            .field("registered", &self.is_registered())
            .field("insecure_tls", &self.insecure_tls)
            .field("basic_auth", &self.basic_auth_username.is_some())
            .field("initial_access_token", &self.initial_access_token.is_some())
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn trimmed(value: Option<String>) -> Option<String> {
    non_empty(value.map(|v| v.trim_end_matches(['\n', '\r']).to_string()))
}

impl OidcCredential {
    #[must_use]
    pub fn from_secret(secret_name: &str, secret: &Secret) -> Self {
        let insecure_tls = secret_value(secret, INSECURE_TLS_KEY)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        Self {
            secret_name: secret_name.to_string(),
            client_id: non_empty(secret_value(secret, CLIENT_ID_KEY)),
            client_secret: non_empty(secret_value(secret, CLIENT_SECRET_KEY)),
            insecure_tls,
            basic_auth_username: non_empty(secret_value(secret, BASIC_AUTH_USERNAME_KEY)),
            basic_auth_password: non_empty(secret_value(secret, BASIC_AUTH_PASSWORD_KEY)),
            initial_access_token: trimmed(secret_value(secret, INITIAL_ACCESS_TOKEN_KEY)),
            token_retrieval_client_id: trimmed(secret_value(secret, TOKEN_RETRIEVAL_CLIENT_ID_KEY)),
            token_retrieval_client_secret: trimmed(secret_value(
                secret,
                TOKEN_RETRIEVAL_CLIENT_SECRET_KEY,
            )),
        }
    }

    /// Both client credentials are present, nothing to provision
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Auth configured directly in the Secret.
    ///
    /// Basic auth takes precedence over an initial access token.
    #[must_use]
    pub fn registration_auth(&self) -> Option<HttpAuth> {
        if let (Some(username), Some(password)) =
            (&self.basic_auth_username, &self.basic_auth_password)
        {
            return Some(HttpAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        self.initial_access_token.clone().map(HttpAuth::Bearer)
    }
}

/// Fields of the provider discovery document used here
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

/// Client credentials grant response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Dynamic client registration response
#[derive(Clone, Deserialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for RegistrationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationResponse")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
