//! Proxy auto-config script.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Path the PAC script is served on, for every host.
pub const PAC_PATH: &str = "/proxy.pac";

const PAC_CONTENT_TYPE: &str = "application/x-ns-proxy-autoconfig";

/// Sends `*.<tld>` through the plaintext listener and everything else direct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacFile {
    tld: String,
    port: u16,
}

impl PacFile {
    pub fn new(tld: impl Into<String>, port: u16) -> Self {
        Self {
            tld: tld.into(),
            port,
        }
    }

    pub fn script(&self) -> String {
        format!(
            "function FindProxyForURL(url, host) {{\n\
             \tif (shExpMatch(host, \"*.{tld}\")) {{\n\
             \t\treturn \"PROXY 127.0.0.1:{port}\";\n\
             \t}}\n\
             \treturn \"DIRECT\";\n\
             }}\n",
            tld = self.tld,
            port = self.port,
        )
    }

    pub fn response(&self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PAC_CONTENT_TYPE)],
            self.script(),
        )
            .into_response()
    }
}
