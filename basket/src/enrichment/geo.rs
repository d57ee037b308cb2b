use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use maxminddb::Reader;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum GeoIpError {
    #[error("failed to open GeoIP database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geo {
    pub anonymized_ip: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Zeroes the host part of an address: the last octet of an IPv4 address,
/// everything after the first 48 bits of an IPv6 one.
pub fn anonymize_ip(ip: &str) -> Option<String> {
    match IpAddr::from_str(ip.trim()).ok()? {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Some(std::net::Ipv4Addr::new(a, b, c, 0).to_string())
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            Some(std::net::Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0).to_string())
        }
    }
}

/// City lookups against a MaxMind database. Without a database only the
/// anonymized address is filled in.
pub struct GeoResolver {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoResolver {
    pub fn new(db_path: PathBuf) -> Result<Self, GeoIpError> {
        debug!("opening GeoIP database at {:?}", db_path);
        let reader = Reader::open_readfile(&db_path)?;
        info!("opened GeoIP database");
        Ok(Self {
            reader: Some(reader),
        })
    }

    pub fn disabled() -> Self {
        Self { reader: None }
    }

    fn lookup(&self, ip: &str) -> Option<Value> {
        let reader = self.reader.as_ref()?;
        let ip = IpAddr::from_str(ip.trim()).ok()?;
        if ip.is_loopback() || ip.is_unspecified() {
            return None;
        }
        reader.lookup::<Value>(ip).ok()
    }

    pub fn get_geo(&self, ip: &str) -> Geo {
        let mut geo = Geo {
            anonymized_ip: anonymize_ip(ip),
            ..Default::default()
        };

        if let Some(city) = self.lookup(ip) {
            geo.country = nested_str(&city, &["country", "iso_code"]);
            geo.region = city
                .get("subdivisions")
                .and_then(|subs| subs.get(0))
                .and_then(|sub| nested_str(sub, &["names", "en"]));
            geo.city = nested_str(&city, &["city", "names", "en"]);
        }
        geo
    }
}

fn nested_str(data: &Value, path: &[&str]) -> Option<String> {
    let mut current = data;
    for &key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anonymizes_v4_and_v6() {
        assert_eq!(anonymize_ip("203.0.113.77"), Some("203.0.113.0".to_string()));
        assert_eq!(
            anonymize_ip("2001:db8:85a3:8d3:1319:8a2e:370:7348"),
            Some("2001:db8:85a3::".to_string())
        );
        assert_eq!(anonymize_ip("not an ip"), None);
        assert_eq!(anonymize_ip(""), None);
    }

    #[test]
    fn disabled_resolver_only_anonymizes() {
        let geo = GeoResolver::disabled().get_geo("198.51.100.23");
        assert_eq!(
            geo,
            Geo {
                anonymized_ip: Some("198.51.100.0".to_string()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn missing_database_fails_to_open() {
        assert!(GeoResolver::new(PathBuf::from("/non/existent/path.mmdb")).is_err());
    }

    #[test]
    fn nested_lookups() {
        let city = json!({
            "country": {"iso_code": "NZ"},
            "subdivisions": [{"names": {"en": "Wellington"}}],
        });
        assert_eq!(nested_str(&city, &["country", "iso_code"]), Some("NZ".to_string()));
        assert_eq!(nested_str(&city, &["city", "names", "en"]), None);
    }
}
