use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// Descriptor scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Ssr,
    Ss,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Ssr => "ssr",
            ServerKind::Ss => "ss",
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ServerKind::Ssr => "ssr://",
            ServerKind::Ss => "ss://",
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed candidate server.
///
/// Built once per cycle through the `with_*` methods; the fingerprint is
/// recomputed after every change so it always matches the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    kind: ServerKind,
    host: String,
    port: String,
    cipher: String,
    #[serde(skip_serializing)]
    password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    obfs: Option<String>,
    #[serde(skip_serializing)]
    params: BTreeMap<String, String>,
    is_priority: bool,
    fingerprint: String,
}

/// Field order here is the canonical serialization; do not reorder.
#[derive(Serialize)]
struct Canonical<'a> {
    kind: ServerKind,
    host: &'a str,
    port: &'a str,
    cipher: &'a str,
    password: &'a str,
    protocol: Option<&'a str>,
    obfs: Option<&'a str>,
    params: &'a BTreeMap<String, String>,
    is_priority: bool,
}

impl ServerDescriptor {
    pub fn new(
        kind: ServerKind,
        host: impl Into<String>,
        port: impl Into<String>,
        cipher: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut server = Self {
            kind,
            host: host.into(),
            port: port.into(),
            cipher: cipher.into(),
            password: password.into(),
            protocol: None,
            obfs: None,
            params: BTreeMap::new(),
            is_priority: false,
            fingerprint: String::new(),
        };
        server.refresh_fingerprint();
        server
    }

    /// Set the SSR protocol and obfs names
    pub fn with_ssr_options(mut self, protocol: impl Into<String>, obfs: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self.obfs = Some(obfs.into());
        self.refresh_fingerprint();
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self.refresh_fingerprint();
        self
    }

    pub fn with_priority(mut self, is_priority: bool) -> Self {
        self.is_priority = is_priority;
        self.refresh_fingerprint();
        self
    }

    fn refresh_fingerprint(&mut self) {
        let canonical = Canonical {
            kind: self.kind,
            host: &self.host,
            port: &self.port,
            cipher: &self.cipher,
            password: &self.password,
            protocol: self.protocol.as_deref(),
            obfs: self.obfs.as_deref(),
            params: &self.params,
            is_priority: self.is_priority,
        };
        // Serializing plain strings and a BTreeMap cannot fail.
        let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
        self.fingerprint = hex::encode(Sha1::digest(&encoded));
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn cipher(&self) -> &str {
        &self.cipher
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn obfs(&self) -> Option<&str> {
        self.obfs.as_deref()
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_priority(&self) -> bool {
        self.is_priority
    }

    /// Content digest, also the proxy name handed to the engine
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Blacklist key (`host:port`, IPv6 hosts bracketed)
    pub fn key(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind.scheme(), self.key())?;
        if self.is_priority {
            write!(f, " (priority)")?;
        }
        Ok(())
    }
}
