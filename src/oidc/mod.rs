//! # OIDC Client Provisioning
//!
//! Ensures a dynamic OIDC client exists for an `oidc_registration` source.
//!
//! ```text
//! Idle ──(secret already holds client_id + client_secret)──▶ done, no calls
//!   │
//!   ▼
//! Discovering ──▶ [TokenAcquisition] ──▶ Registering ──▶ Persisted
//! ```
//!
//! Registration auth is chosen in this order: Basic auth from the Secret, the
//! Secret's initial access token as Bearer, or a token obtained with a client
//! credentials grant. A failed grant is logged and registration continues
//! without auth. The Secret is written at most once, after a successful
//! registration, so a second run short-circuits at `Idle`.

mod types;

pub use types::{
    DiscoveryDocument, OidcCredential, RegistrationResponse, TokenResponse, CLIENT_ID_KEY,
    CLIENT_SECRET_KEY,
};

use crate::error::{Error, Result};
use crate::http::{HttpAuth, HttpFetcher, HttpRequest, HttpResponse};
use crate::observability::metrics;
use crate::source::OidcRegistration;
use crate::store::ObjectStore;
use k8s_openapi::ByteString;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Steps of one provisioning attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Idle,
    Discovering,
    TokenAcquisition,
    Registering,
    Persisted,
}

impl ProvisioningState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::TokenAcquisition => "token_acquisition",
            Self::Registering => "registering",
            Self::Persisted => "persisted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The Secret already held client credentials
    AlreadyRegistered,
    /// A new client was registered and persisted
    Registered { client_id: String },
}

pub struct OidcClientProvisioner {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl std::fmt::Debug for OidcClientProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClientProvisioner").finish_non_exhaustive()
    }
}

fn enter(state: ProvisioningState) {
    debug!(state = state.as_str(), "oidc.provisioning.transition");
}

impl OidcClientProvisioner {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Make sure the registration's Secret holds client credentials
    pub async fn ensure_client(
        &self,
        namespace: &str,
        registration: &OidcRegistration,
    ) -> Result<ProvisionOutcome> {
        let span = info_span!(
            "oidc.provision",
            resource.namespace = namespace,
            secret.name = registration.secret_name.as_str(),
            discovery.endpoint = registration.discovery_endpoint.as_str()
        );

        async move {
            let secret = self
                .store
                .get_secret(namespace, &registration.secret_name)
                .await?;
            let credential = OidcCredential::from_secret(&registration.secret_name, &secret);

            enter(ProvisioningState::Idle);
            if credential.is_registered() {
                debug!("Secret already holds client credentials, skipping registration");
                return Ok(ProvisionOutcome::AlreadyRegistered);
            }

            enter(ProvisioningState::Discovering);
            let discovery = self
                .discover(&registration.discovery_endpoint, credential.insecure_tls)
                .await?;
            let registration_endpoint = discovery
                .registration_endpoint
                .clone()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    Error::fetch(
                        &registration.discovery_endpoint,
                        "discovery document has no registration_endpoint",
                    )
                })?;

            let auth = match credential.registration_auth() {
                Some(auth) => Some(auth),
                None => {
                    enter(ProvisioningState::TokenAcquisition);
                    match self
                        .acquire_token(&discovery, &credential, registration)
                        .await
                    {
                        Ok(token) => Some(HttpAuth::Bearer(token)),
                        Err(e) => {
                            warn!(
                                error = %e,
                                "Token acquisition failed, registering without authorization"
                            );
                            None
                        }
                    }
                }
            };

            enter(ProvisioningState::Registering);
            let (client_id, client_secret) = self
                .register(
                    &registration_endpoint,
                    registration,
                    auth,
                    credential.insecure_tls,
                )
                .await?;

            let mut updated = secret;
            let data = updated.data.get_or_insert_with(Default::default);
            data.insert(
                CLIENT_ID_KEY.to_string(),
                ByteString(client_id.clone().into_bytes()),
            );
            data.insert(
                CLIENT_SECRET_KEY.to_string(),
                ByteString(client_secret.into_bytes()),
            );
            self.store
                .replace_secret(namespace, &updated)
                .await
                .map_err(Error::Persistence)?;

            enter(ProvisioningState::Persisted);
            metrics::increment_oidc_registrations();
            info!(client.id = client_id.as_str(), "Registered OIDC client");
            Ok(ProvisionOutcome::Registered { client_id })
        }
        .instrument(span)
        .await
    }

    async fn discover(&self, endpoint: &str, insecure_tls: bool) -> Result<DiscoveryDocument> {
        let response = self
            .fetcher
            .execute(HttpRequest::get(endpoint).insecure_tls(insecure_tls))
            .await?;
        parse_json(endpoint, &response)
    }

    async fn acquire_token(
        &self,
        discovery: &DiscoveryDocument,
        credential: &OidcCredential,
        registration: &OidcRegistration,
    ) -> Result<String> {
        let token_endpoint = discovery
            .token_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                Error::fetch(
                    &registration.discovery_endpoint,
                    "discovery document has no token_endpoint",
                )
            })?;

        let (Some(client_id), Some(client_secret)) = (
            &credential.token_retrieval_client_id,
            &credential.token_retrieval_client_secret,
        ) else {
            return Err(Error::validation(format!(
                "secret {} has no token retrieval client credentials",
                credential.secret_name
            )));
        };

        // The serializer is not Send and must be dropped before the await
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("grant_type", "client_credentials")
                .append_pair("client_id", client_id)
                .append_pair("client_secret", client_secret);
            if let Some(scopes) = registration.token_scopes() {
                form.append_pair("scope", &scopes);
            }
            form.finish()
        };

        let response = self
            .fetcher
            .execute(HttpRequest::post(token_endpoint, body).insecure_tls(credential.insecure_tls))
            .await?;
        let token: TokenResponse = parse_json(token_endpoint, &response)?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::fetch(token_endpoint, "token response has no access_token"))
    }

    async fn register(
        &self,
        endpoint: &str,
        registration: &OidcRegistration,
        auth: Option<HttpAuth>,
        insecure_tls: bool,
    ) -> Result<(String, String)> {
        let body = registration.registration_body().to_string();
        let response = self
            .fetcher
            .execute(
                HttpRequest::post(endpoint, body)
                    .auth(auth)
                    .insecure_tls(insecure_tls),
            )
            .await?;
        let registered: RegistrationResponse = parse_json(endpoint, &response)?;

        match (registered.client_id, registered.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
            _ => Err(Error::fetch(
                endpoint,
                "registration response is missing client_id or client_secret",
            )),
        }
    }
}

fn parse_json<T: DeserializeOwned>(url: &str, response: &HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(Error::fetch(
            url,
            format!("unexpected status {}: {}", response.status, response.body),
        ));
    }
    serde_json::from_str(&response.body)
        .map_err(|e| Error::fetch(url, format!("invalid JSON response: {e}")))
}
