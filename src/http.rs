//! Shared plumbing for the REST clients.

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};

use crate::auth::SessionHandle;
use crate::config::BackendConfig;

/// Requests have no timeout unless `request_timeout` is set.
pub(crate) fn build_client(config: &BackendConfig) -> Result<Client, reqwest::Error> {
    let mut builder =
        Client::builder().user_agent(concat!("casefile/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Attach `apikey` and a bearer token: the session's when signed in, the
/// anon key otherwise.
pub(crate) fn authorize(
    request: RequestBuilder,
    anon_key: &SecretString,
    session: &SessionHandle,
) -> RequestBuilder {
    let request = request.header("apikey", anon_key.expose_secret());
    match session.current() {
        Some(current) => request.bearer_auth(current.access_token.expose_secret()),
        None => request.bearer_auth(anon_key.expose_secret()),
    }
}

/// Pull a human-readable message out of a backend error body.
pub(crate) fn backend_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    #[test]
    fn backend_message_prefers_message_field() {
        let body = r#"{"code":"42501","message":"new row violates row-level security policy"}"#;
        assert_eq!(
            super::backend_message(body),
            "new row violates row-level security policy"
        );
    }

    #[test]
    fn backend_message_reads_auth_error_shape() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(super::backend_message(body), "Invalid login credentials");
    }

    #[test]
    fn backend_message_falls_back_to_raw_text() {
        assert_eq!(super::backend_message(" Bad Gateway \n"), "Bad Gateway");
    }
}
