//! Descriptor parsing for `ssr://` and `ss://` lines
//!
//! Every failure is reported as `None` so one bad line never affects the
//! rest of the batch.

use std::collections::BTreeMap;

use super::payload::decode_base64_text;
use crate::models::{ServerDescriptor, ServerKind};

/// Label marker that promotes a server ahead of the others
pub const PRIORITY_MARKER: &str = "[Premium]";

/// Parse one subscription line; unknown schemes and malformed lines yield `None`
pub fn parse_server(line: &str) -> Option<ServerDescriptor> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(ServerKind::Ssr.scheme()) {
        return parse_ssr(rest);
    }
    if let Some(rest) = line.strip_prefix(ServerKind::Ss.scheme()) {
        return parse_ss(rest);
    }

    None
}

fn has_priority_marker(label: &str) -> bool {
    label.contains(PRIORITY_MARKER)
}

/// `ssr://BASE64(host:port:protocol:cipher:obfs:BASE64(password)/?k=BASE64(v)&...)`
fn parse_ssr(encoded: &str) -> Option<ServerDescriptor> {
    let decoded = decode_base64_text(encoded)?;

    let (head, query) = match decoded.split_once("/?") {
        Some((head, query)) => (head, Some(query)),
        None => (decoded.trim_end_matches('/'), None),
    };

    // Split from the right so an unbracketed IPv6 host keeps its colons.
    let mut fields = head.rsplitn(5, ':');
    let password = decode_base64_text(fields.next()?)?;
    let obfs = fields.next()?;
    let cipher = fields.next()?;
    let protocol = fields.next()?;
    let (host, port) = split_host_port(fields.next()?)?;

    if cipher.is_empty() {
        return None;
    }

    let mut params = BTreeMap::new();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(key.to_string(), decode_base64_text(value)?);
        }
    }

    let is_priority = params
        .get("remarks")
        .map(|remarks| has_priority_marker(remarks))
        .unwrap_or(false);

    Some(
        ServerDescriptor::new(ServerKind::Ssr, host, port, cipher, password)
            .with_ssr_options(protocol, obfs)
            .with_params(params)
            .with_priority(is_priority),
    )
}

/// `ss://BASE64URL(method:password)@host:port/?plugin=...#label`, or the
/// legacy `ss://BASE64(method:password@host:port)#label`
fn parse_ss(rest: &str) -> Option<ServerDescriptor> {
    let (body, label) = match rest.split_once('#') {
        Some((body, label)) => (body, Some(percent_decode_lossy(label))),
        None => (rest, None),
    };
    let is_priority = label.as_deref().map(has_priority_marker).unwrap_or(false);

    let (main, query) = match body.split_once("/?").or_else(|| body.split_once('?')) {
        Some((main, query)) => (main, Some(query)),
        None => (body, None),
    };
    let main = main.trim_end_matches('/');

    let (cipher, password, host, port) = match main.rsplit_once('@') {
        Some((userinfo, endpoint)) => {
            let credentials = decode_userinfo(userinfo)?;
            let (cipher, password) = credentials.split_once(':')?;
            let (host, port) = split_host_port(endpoint)?;
            (cipher.to_string(), password.to_string(), host, port)
        }
        None => {
            let decoded = decode_base64_text(main)?;
            let (credentials, endpoint) = decoded.rsplit_once('@')?;
            let (cipher, password) = credentials.split_once(':')?;
            let (host, port) = split_host_port(endpoint)?;
            (cipher.to_string(), password.to_string(), host, port)
        }
    };

    if cipher.is_empty() {
        return None;
    }

    let params = match query {
        Some(query) => parse_plugin_params(query)?,
        None => BTreeMap::new(),
    };

    Some(
        ServerDescriptor::new(ServerKind::Ss, host, port, cipher, password)
            .with_params(params)
            .with_priority(is_priority),
    )
}

/// SIP002 userinfo is base64 in practice; a percent-encoded plain form is
/// accepted as well.
fn decode_userinfo(userinfo: &str) -> Option<String> {
    decode_base64_text(userinfo)
        .filter(|text| text.contains(':'))
        .or_else(|| {
            urlencoding::decode(userinfo)
                .ok()
                .map(|text| text.into_owned())
                .filter(|text| text.contains(':'))
        })
}

/// Percent-decode each `&` pair, then split SIP003 plugin options on `;`.
fn parse_plugin_params(query: &str) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let decoded = urlencoding::decode(pair).ok()?;
        for option in decoded.split(';').filter(|o| !o.is_empty()) {
            let (key, value) = option.split_once('=').unwrap_or((option, ""));
            params.insert(key.to_string(), value.to_string());
        }
    }

    Some(params)
}

fn split_host_port(endpoint: &str) -> Option<(String, String)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }

    Some((host.to_string(), port.to_string()))
}

fn percent_decode_lossy(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;

    fn ssr_line(host: &str, remarks: &str) -> String {
        let inner = format!(
            "{}:8388:auth_aes128_md5:aes-256-cfb:tls1.2_ticket_auth:{}/?obfsparam={}&protoparam={}&remarks={}",
            host,
            URL_SAFE_NO_PAD.encode("secret"),
            URL_SAFE_NO_PAD.encode("cdn.example.com"),
            URL_SAFE_NO_PAD.encode("123:abc"),
            URL_SAFE_NO_PAD.encode(remarks),
        );
        format!("ssr://{}", URL_SAFE_NO_PAD.encode(inner))
    }

    #[test]
    fn parses_ssr_descriptor() {
        let server = parse_server(&ssr_line("ssr.example.com", "Tokyo 01")).unwrap();

        assert_eq!(server.kind(), ServerKind::Ssr);
        assert_eq!(server.host(), "ssr.example.com");
        assert_eq!(server.port(), "8388");
        assert_eq!(server.protocol(), Some("auth_aes128_md5"));
        assert_eq!(server.cipher(), "aes-256-cfb");
        assert_eq!(server.obfs(), Some("tls1.2_ticket_auth"));
        assert_eq!(server.password(), "secret");
        assert_eq!(server.param("obfsparam"), Some("cdn.example.com"));
        assert_eq!(server.param("protoparam"), Some("123:abc"));
        assert!(!server.is_priority());
    }

    #[test]
    fn ssr_priority_comes_from_remarks() {
        let server = parse_server(&ssr_line("ssr.example.com", "[Premium] Tokyo")).unwrap();
        assert!(server.is_priority());
    }

    #[test]
    fn ssr_keeps_ipv6_host() {
        let server = parse_server(&ssr_line("2001:db8::1", "v6")).unwrap();
        assert_eq!(server.host(), "2001:db8::1");
        assert_eq!(server.key(), "[2001:db8::1]:8388");
    }

    #[test]
    fn parses_sip002_descriptor_with_plugin() {
        let line = format!(
            "ss://{}@ss.example.com:443/?plugin={}#{}",
            URL_SAFE_NO_PAD.encode("chacha20-ietf-poly1305:pa:ss"),
            urlencoding::encode("obfs-local;obfs=http;obfs-host=cdn.example.com"),
            urlencoding::encode("[Premium] HK 02"),
        );
        let server = parse_server(&line).unwrap();

        assert_eq!(server.kind(), ServerKind::Ss);
        assert_eq!(server.host(), "ss.example.com");
        assert_eq!(server.port(), "443");
        assert_eq!(server.cipher(), "chacha20-ietf-poly1305");
        assert_eq!(server.password(), "pa:ss");
        assert_eq!(server.param("plugin"), Some("obfs-local"));
        assert_eq!(server.param("obfs"), Some("http"));
        assert_eq!(server.param("obfs-host"), Some("cdn.example.com"));
        assert!(server.is_priority());
    }

    #[test]
    fn label_does_not_leak_into_endpoint() {
        let line = format!(
            "ss://{}@1.2.3.4:8388#Plain%20Label",
            URL_SAFE_NO_PAD.encode("aes-128-gcm:pw")
        );
        let server = parse_server(&line).unwrap();
        assert_eq!(server.port(), "8388");
        assert!(!server.is_priority());
        assert!(server.params().is_empty());
    }

    #[test]
    fn sip002_keeps_bracketed_ipv6_host() {
        let line = format!(
            "ss://{}@[2001:db8::1]:443/?plugin={}#v6",
            URL_SAFE_NO_PAD.encode("aes-128-gcm:pw"),
            urlencoding::encode("obfs-local;obfs=tls"),
        );
        let server = parse_server(&line).unwrap();

        assert_eq!(server.host(), "2001:db8::1");
        assert_eq!(server.port(), "443");
        assert_eq!(server.key(), "[2001:db8::1]:443");
        assert_eq!(server.param("obfs"), Some("tls"));

        let legacy = format!(
            "ss://{}",
            STANDARD.encode("aes-128-gcm:pw@[2001:db8::1]:443")
        );
        assert_eq!(parse_server(&legacy).unwrap().key(), "[2001:db8::1]:443");

        let bad_port = format!(
            "ss://{}@[2001:db8::1]:http",
            URL_SAFE_NO_PAD.encode("aes-128-gcm:pw")
        );
        assert!(parse_server(&bad_port).is_none());
    }

    #[test]
    fn parses_legacy_ss_descriptor() {
        let line = format!(
            "ss://{}#legacy",
            STANDARD.encode("aes-256-cfb:p@ss@legacy.example.com:8080")
        );
        let server = parse_server(&line).unwrap();
        assert_eq!(server.host(), "legacy.example.com");
        assert_eq!(server.port(), "8080");
        assert_eq!(server.password(), "p@ss");
    }

    #[test]
    fn parsing_is_deterministic() {
        let line = ssr_line("ssr.example.com", "[Premium] Tokyo");
        let first = parse_server(&line).unwrap();
        let second = parse_server(&line).unwrap();
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_unknown_schemes_and_malformed_lines() {
        assert!(parse_server("vmess://eyJhZGQiOiIxIn0=").is_none());
        assert!(parse_server("ssr://!!!").is_none());
        assert!(parse_server(&format!("ssr://{}", STANDARD.encode("host:1:proto"))).is_none());
        assert!(parse_server("ss://@host:1").is_none());
        assert!(parse_server(&format!(
            "ss://{}@host:notaport",
            URL_SAFE_NO_PAD.encode("aes-128-gcm:pw")
        ))
        .is_none());
        assert!(parse_server(&format!("ss://{}@host:1", URL_SAFE_NO_PAD.encode("nocolon"))).is_none());
    }
}
