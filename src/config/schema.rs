//! Configuration schema definitions.
//!
//! This module defines the persisted configuration structure for the proxy.
//! All types derive Serde traits for (de)serialization from `config.json`.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Top-level domain advertised through the PAC file (e.g. "wip").
    pub tld: String,

    /// Plaintext listener address (e.g. "localhost:7999" or ":80").
    pub addr: String,

    /// TLS listener address. Empty disables the TLS listener.
    pub tls_addr: String,

    /// PEM private key of an external CA used to sign the leaf certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_key_file: Option<String>,

    /// PEM certificate of the external CA. Derived from `ca_key_file` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_file: Option<String>,

    /// Sign the leaf certificate with the root CA installed by `mkcert`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_mkcert: bool,

    /// Where CONNECT tunnels are dialed.
    pub connect_policy: ConnectPolicy,

    /// Ordered routing entries. Earlier entries win.
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            tld: "wip".to_string(),
            addr: "localhost:7999".to_string(),
            tls_addr: "localhost:7998".to_string(),
            ca_key_file: None,
            ca_cert_file: None,
            use_mkcert: false,
            connect_policy: ConnectPolicy::default(),
            entries: vec![Entry::host("example.wip", "localhost:8000")],
        }
    }
}

impl ProxyConfig {
    /// Address suitable for binding a socket.
    ///
    /// A bare `:port` binds every interface.
    pub fn bind_address(&self) -> String {
        normalize_bind_address(&self.addr)
    }

    /// TLS bind address, `None` when TLS is disabled.
    pub fn tls_bind_address(&self) -> Option<String> {
        let addr = self.tls_addr.trim();
        if addr.is_empty() {
            None
        } else {
            Some(normalize_bind_address(addr))
        }
    }

    /// Port of the plaintext listener as advertised in the PAC file.
    pub fn plaintext_port(&self) -> Option<&str> {
        self.addr
            .rsplit_once(':')
            .map(|(_, port)| port)
            .filter(|port| !port.is_empty())
    }

    /// CA certificate path, defaulting to the key path with a `.crt` suffix.
    pub fn ca_cert_path(&self) -> Option<String> {
        match (&self.ca_cert_file, &self.ca_key_file) {
            (Some(cert), _) if !cert.is_empty() => Some(cert.clone()),
            (_, Some(key)) if !key.is_empty() => {
                let stem = key.strip_suffix(".key").unwrap_or(key);
                Some(format!("{stem}.crt"))
            }
            _ => None,
        }
    }

    /// Find the entry whose pattern is exactly `host`.
    pub fn entry_mut(&mut self, host: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.host == host)
    }
}

fn normalize_bind_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// A single host mapping: a hostname pattern routed to a host or a folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Entry {
    /// Hostname pattern; `*` matches exactly one label.
    pub host: String,

    /// Backend host, with or without scheme (e.g. "localhost:3000").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    /// Folder of static files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_folder: Option<String>,
}

impl Entry {
    /// Entry proxying to a backend host.
    pub fn host(pattern: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            host: pattern.into(),
            dest: Some(dest.into()),
            dest_folder: None,
        }
    }

    /// Entry serving a folder.
    pub fn folder(pattern: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            host: pattern.into(),
            dest: None,
            dest_folder: Some(folder.into()),
        }
    }

    /// Destination as a display string, for logs and CLI output.
    pub fn destination(&self) -> &str {
        self.dest
            .as_deref()
            .or(self.dest_folder.as_deref())
            .unwrap_or("")
    }
}

/// Target selection for CONNECT tunnels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Dial the matched entry's destination host.
    #[default]
    Destination,
    /// Send CONNECTs for port 443 to the local TLS listener so TLS terminates
    /// here; other ports still dial the destination.
    TlsListener,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.tld, "wip");
        assert_eq!(config.addr, "localhost:7999");
        assert_eq!(config.tls_addr, "localhost:7998");
        assert_eq!(config.entries, vec![Entry::host("example.wip", "localhost:8000")]);
        assert_eq!(config.connect_policy, ConnectPolicy::Destination);
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let config = ProxyConfig {
            addr: ":80".into(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.bind_address(), "0.0.0.0:80");
        assert_eq!(config.plaintext_port(), Some("80"));
    }

    #[test]
    fn empty_tls_addr_disables_tls() {
        let config = ProxyConfig {
            tls_addr: String::new(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.tls_bind_address(), None);
    }

    #[test]
    fn ca_cert_path_derived_from_key() {
        let mut config = ProxyConfig {
            ca_key_file: Some("/etc/ca/root.key".into()),
            ..ProxyConfig::default()
        };
        assert_eq!(config.ca_cert_path().as_deref(), Some("/etc/ca/root.crt"));

        config.ca_cert_file = Some("/etc/ca/other.pem".into());
        assert_eq!(config.ca_cert_path().as_deref(), Some("/etc/ca/other.pem"));
    }

    #[test]
    fn entry_json_shape() {
        let json = serde_json::to_string(&Entry::folder("files.wip", "/srv/www")).unwrap();
        assert_eq!(json, r#"{"host":"files.wip","dest_folder":"/srv/www"}"#);

        let entry: Entry = serde_json::from_str(r#"{"host":"a.wip","dest":"localhost:1"}"#).unwrap();
        assert_eq!(entry, Entry::host("a.wip", "localhost:1"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ProxyConfig = serde_json::from_str(r#"{"entries": []}"#).unwrap();
        assert_eq!(config.addr, "localhost:7999");
        assert!(config.entries.is_empty());

        let policy: ConnectPolicy = serde_json::from_str(r#""tls_listener""#).unwrap();
        assert_eq!(policy, ConnectPolicy::TlsListener);
    }
}
