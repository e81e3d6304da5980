//! Listener configuration parsing: a flat string representation for
//! each listener role, validated for cross-field constraints (scheme
//! uniqueness per role, required BOS bind/advertise pairs) before use,
//! with a `to_raw()` that round-trips it back to that representation.

use std::collections::BTreeMap;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

fn parse_host_port(raw: &str) -> Result<HostPort, ConfigError> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Malformed(raw.to_string()))?;
    if host.is_empty() {
        return Err(ConfigError::MissingField("host"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::Malformed(raw.to_string()))?;
    Ok(HostPort {
        host: host.to_string(),
        port,
    })
}

fn parse_scheme_uri(raw: &str) -> Result<(String, HostPort), ConfigError> {
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| ConfigError::Malformed(raw.to_string()))?;
    if scheme.is_empty() {
        return Err(ConfigError::MissingField("scheme"));
    }
    let host_port = parse_host_port(rest)?;
    Ok((scheme.to_string(), host_port))
}

/// Parses one role's list of `SCHEME://HOST:PORT` entries into a
/// per-scheme map, skipping blanks and rejecting scheme reuse within
/// the role.
fn parse_scheme_role(entries: &[String]) -> Result<BTreeMap<String, HostPort>, ConfigError> {
    let mut map = BTreeMap::new();
    for entry in entries {
        if entry.trim().is_empty() {
            continue;
        }
        let (scheme, host_port) = parse_scheme_uri(entry)?;
        if map.insert(scheme.clone(), host_port).is_some() {
            return Err(ConfigError::DuplicateScheme(scheme));
        }
    }
    Ok(map)
}

/// The flat string form a config file or CLI flag set actually carries.
#[derive(Debug, Clone, Default)]
pub struct RawListenersCfg {
    pub bind: Vec<String>,
    pub advertise_plain: Vec<String>,
    pub advertise_ssl: Vec<String>,
    pub kerberos: Vec<String>,
    pub toc: Vec<String>,
    pub api: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BosListener {
    pub scheme: String,
    pub bind: HostPort,
    pub advertise_plain: HostPort,
    pub advertise_ssl: Option<HostPort>,
    pub kerberos: Option<HostPort>,
}

impl BosListener {
    pub fn ssl_enabled(&self) -> bool {
        self.advertise_ssl.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenersCfg {
    pub bos: Vec<BosListener>,
    pub toc: Vec<HostPort>,
    pub api: Option<HostPort>,
}

/// Validate and normalize a raw listener set into a `ListenersCfg`.
pub fn parse_listeners_cfg(raw: &RawListenersCfg) -> Result<ListenersCfg, ConfigError> {
    let bind = parse_scheme_role(&raw.bind)?;
    let advertise_plain = parse_scheme_role(&raw.advertise_plain)?;
    let advertise_ssl = parse_scheme_role(&raw.advertise_ssl)?;
    let kerberos = parse_scheme_role(&raw.kerberos)?;

    let mut schemes: Vec<&String> = bind
        .keys()
        .chain(advertise_plain.keys())
        .chain(advertise_ssl.keys())
        .chain(kerberos.keys())
        .collect();
    schemes.sort();
    schemes.dedup();

    let mut bos = Vec::new();
    for scheme in schemes {
        let bind_addr = bind
            .get(scheme)
            .cloned()
            .ok_or(ConfigError::MissingField("BOS bind address"))?;
        let advertise_addr = advertise_plain
            .get(scheme)
            .cloned()
            .ok_or(ConfigError::MissingField("plaintext advertised host"))?;
        bos.push(BosListener {
            scheme: scheme.clone(),
            bind: bind_addr,
            advertise_plain: advertise_addr,
            advertise_ssl: advertise_ssl.get(scheme).cloned(),
            kerberos: kerberos.get(scheme).cloned(),
        });
    }
    if bos.is_empty() {
        return Err(ConfigError::NoBosListener);
    }

    let mut toc = Vec::new();
    for entry in &raw.toc {
        if entry.trim().is_empty() {
            continue;
        }
        toc.push(parse_host_port(entry)?);
    }

    let api = match &raw.api {
        None => None,
        Some(entry) if entry.trim().is_empty() => return Err(ConfigError::BlankApiListener),
        Some(entry) => Some(parse_host_port(entry)?),
    };

    Ok(ListenersCfg { bos, toc, api })
}

impl ListenersCfg {
    /// Reconstructs a `RawListenersCfg` that re-parses to an equal
    /// `ListenersCfg`. Scheme order is canonicalized (sorted), so the
    /// round trip is stable even if the original input wasn't.
    pub fn to_raw(&self) -> RawListenersCfg {
        let mut bind = Vec::new();
        let mut advertise_plain = Vec::new();
        let mut advertise_ssl = Vec::new();
        let mut kerberos = Vec::new();
        for listener in &self.bos {
            bind.push(format!(
                "{}://{}:{}",
                listener.scheme, listener.bind.host, listener.bind.port
            ));
            advertise_plain.push(format!(
                "{}://{}:{}",
                listener.scheme, listener.advertise_plain.host, listener.advertise_plain.port
            ));
            if let Some(ssl) = &listener.advertise_ssl {
                advertise_ssl.push(format!("{}://{}:{}", listener.scheme, ssl.host, ssl.port));
            }
            if let Some(krb) = &listener.kerberos {
                kerberos.push(format!("{}://{}:{}", listener.scheme, krb.host, krb.port));
            }
        }
        let toc = self
            .toc
            .iter()
            .map(|hp| format!("{}:{}", hp.host, hp.port))
            .collect();
        let api = self.api.as_ref().map(|hp| format!("{}:{}", hp.host, hp.port));
        RawListenersCfg {
            bind,
            advertise_plain,
            advertise_ssl,
            kerberos,
            toc,
            api,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawListenersCfg {
        RawListenersCfg {
            bind: vec!["aim://0.0.0.0:5190".to_string(), "".to_string()],
            advertise_plain: vec!["aim://login.example.com:5190".to_string()],
            advertise_ssl: vec!["aim://login.example.com:443".to_string()],
            kerberos: vec![],
            toc: vec!["0.0.0.0:9898".to_string(), "".to_string()],
            api: Some("127.0.0.1:8080".to_string()),
        }
    }

    #[test]
    fn parses_a_full_valid_config() {
        let cfg = parse_listeners_cfg(&sample_raw()).unwrap();
        assert_eq!(cfg.bos.len(), 1);
        let bos = &cfg.bos[0];
        assert_eq!(bos.scheme, "aim");
        assert_eq!(bos.bind.port, 5190);
        assert!(bos.ssl_enabled());
        assert_eq!(cfg.toc.len(), 1);
        assert_eq!(cfg.api.as_ref().unwrap().port, 8080);
    }

    #[test]
    fn missing_bos_listener_is_an_error() {
        let raw = RawListenersCfg::default();
        assert!(matches!(
            parse_listeners_cfg(&raw),
            Err(ConfigError::NoBosListener)
        ));
    }

    #[test]
    fn duplicate_scheme_within_a_role_is_an_error() {
        let raw = RawListenersCfg {
            bind: vec![
                "aim://0.0.0.0:5190".to_string(),
                "aim://0.0.0.0:5191".to_string(),
            ],
            advertise_plain: vec!["aim://login.example.com:5190".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            parse_listeners_cfg(&raw),
            Err(ConfigError::DuplicateScheme(_))
        ));
    }

    #[test]
    fn scheme_missing_advertised_host_is_an_error() {
        let raw = RawListenersCfg {
            bind: vec!["aim://0.0.0.0:5190".to_string()],
            advertise_plain: vec![],
            ..Default::default()
        };
        assert!(matches!(
            parse_listeners_cfg(&raw),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn blank_api_listener_is_an_error() {
        let raw = RawListenersCfg {
            api: Some("   ".to_string()),
            ..sample_raw()
        };
        assert!(matches!(
            parse_listeners_cfg(&raw),
            Err(ConfigError::BlankApiListener)
        ));
    }

    #[test]
    fn round_trip_through_to_raw_is_idempotent() {
        // parsing the round-tripped raw config yields the same result.
        let first = parse_listeners_cfg(&sample_raw()).unwrap();
        let second = parse_listeners_cfg(&first.to_raw()).unwrap();
        assert_eq!(first, second);
    }
}
