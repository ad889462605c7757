//! Engine configuration document
//!
//! The engine runs in global mode with exactly one proxy, named by the
//! descriptor's fingerprint.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{ServerDescriptor, ServerKind};

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct EngineDocument<'a> {
    port: u16,
    mode: &'static str,
    allow_lan: bool,
    external_controller: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
    proxies: Vec<ProxyEntry<'a>>,
}

/// Numeric when the port parses, verbatim otherwise
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PortValue<'a> {
    Number(u16),
    Text(&'a str),
}

impl<'a> PortValue<'a> {
    fn from_text(port: &'a str) -> Self {
        port.parse().map(PortValue::Number).unwrap_or(PortValue::Text(port))
    }
}

#[derive(Debug, Serialize)]
struct PluginOpts<'a> {
    mode: &'a str,
    host: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ProxyEntry<'a> {
    Ssr {
        name: &'a str,
        server: &'a str,
        port: PortValue<'a>,
        cipher: &'a str,
        password: &'a str,
        protocol: &'a str,
        #[serde(rename = "protocol-param")]
        protocol_param: &'a str,
        obfs: &'a str,
        #[serde(rename = "obfs-param")]
        obfs_param: &'a str,
    },
    Ss {
        name: &'a str,
        server: &'a str,
        port: PortValue<'a>,
        cipher: &'a str,
        password: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        plugin: Option<&'static str>,
        #[serde(rename = "plugin-opts", skip_serializing_if = "Option::is_none")]
        plugin_opts: Option<PluginOpts<'a>>,
    },
}

fn proxy_entry(server: &ServerDescriptor) -> ProxyEntry<'_> {
    let name = server.fingerprint();
    let port = PortValue::from_text(server.port());

    match server.kind() {
        ServerKind::Ssr => ProxyEntry::Ssr {
            name,
            server: server.host(),
            port,
            cipher: server.cipher(),
            password: server.password(),
            protocol: server.protocol().unwrap_or("origin"),
            protocol_param: server.param("protoparam").unwrap_or(""),
            obfs: server.obfs().unwrap_or("plain"),
            obfs_param: server.param("obfsparam").unwrap_or(""),
        },
        ServerKind::Ss => {
            let plugin_opts = server.param("obfs").map(|mode| PluginOpts {
                mode,
                host: server.param("obfs-host").unwrap_or(""),
            });

            ProxyEntry::Ss {
                name,
                server: server.host(),
                port,
                cipher: server.cipher(),
                password: server.password(),
                plugin: plugin_opts.as_ref().map(|_| "obfs"),
                plugin_opts,
            }
        }
    }
}

/// Render the engine's YAML configuration for `server`
pub fn render(server: &ServerDescriptor, engine: &EngineConfig) -> Result<String> {
    let document = EngineDocument {
        port: engine.proxy_port,
        mode: "global",
        allow_lan: true,
        external_controller: &engine.controller,
        secret: engine.secret.as_deref(),
        proxies: vec![proxy_entry(server)],
    };

    Ok(serde_yaml::to_string(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn parse(yaml: &str) -> serde_yaml::Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn renders_ssr_proxy() {
        let mut params = BTreeMap::new();
        params.insert("protoparam".to_string(), "123:abc".to_string());
        params.insert("obfsparam".to_string(), "cdn.example.com".to_string());
        let server = ServerDescriptor::new(ServerKind::Ssr, "1.2.3.4", "8388", "aes-256-cfb", "pw")
            .with_ssr_options("auth_aes128_md5", "tls1.2_ticket_auth")
            .with_params(params);

        let doc = parse(&render(&server, &EngineConfig::default()).unwrap());

        assert_eq!(doc["port"], 7890);
        assert_eq!(doc["mode"], "global");
        assert_eq!(doc["allow-lan"], true);
        assert_eq!(doc["external-controller"], "127.0.0.1:9090");
        assert!(doc.get("secret").is_none());

        let proxy = &doc["proxies"][0];
        assert_eq!(proxy["name"], server.fingerprint());
        assert_eq!(proxy["type"], "ssr");
        assert_eq!(proxy["server"], "1.2.3.4");
        assert_eq!(proxy["port"], 8388);
        assert_eq!(proxy["cipher"], "aes-256-cfb");
        assert_eq!(proxy["password"], "pw");
        assert_eq!(proxy["protocol"], "auth_aes128_md5");
        assert_eq!(proxy["protocol-param"], "123:abc");
        assert_eq!(proxy["obfs"], "tls1.2_ticket_auth");
        assert_eq!(proxy["obfs-param"], "cdn.example.com");
    }

    #[test]
    fn renders_ss_proxy_with_obfs_plugin() {
        let mut params = BTreeMap::new();
        params.insert("plugin".to_string(), "obfs-local".to_string());
        params.insert("obfs".to_string(), "http".to_string());
        params.insert("obfs-host".to_string(), "cdn.example.com".to_string());
        let server = ServerDescriptor::new(ServerKind::Ss, "ss.example.com", "443", "aes-128-gcm", "pw")
            .with_params(params);

        let engine = EngineConfig {
            secret: Some("s3cret".to_string()),
            ..EngineConfig::default()
        };
        let doc = parse(&render(&server, &engine).unwrap());

        assert_eq!(doc["secret"], "s3cret");
        let proxy = &doc["proxies"][0];
        assert_eq!(proxy["type"], "ss");
        assert_eq!(proxy["plugin"], "obfs");
        assert_eq!(proxy["plugin-opts"]["mode"], "http");
        assert_eq!(proxy["plugin-opts"]["host"], "cdn.example.com");
    }

    #[test]
    fn omits_plugin_without_obfs() {
        let server = ServerDescriptor::new(ServerKind::Ss, "ss.example.com", "443", "aes-128-gcm", "pw");
        let doc = parse(&render(&server, &EngineConfig::default()).unwrap());

        let proxy = &doc["proxies"][0];
        assert!(proxy.get("plugin").is_none());
        assert!(proxy.get("plugin-opts").is_none());
    }
}
