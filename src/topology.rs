//! Topology model and topology-file parsing.
//!
//! The file is YAML. IP fields are deserialized as plain strings and then
//! run through a hand-rolled dotted-quad parser — never
//! `std::net::Ipv4Addr::from_str`, whose accepted grammar is more lenient
//! than we want (it tolerates leading-zero/octal ambiguities we'd rather
//! reject outright).

use crate::error::TopologyError;
use crate::packet::Address;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawServer {
    ip: String,
    port: u16,
    #[serde(rename = "ttl-drop")]
    ttl_drop: u8,
}

#[derive(Debug, Deserialize)]
struct RawRouter {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct RawAttacker {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct RawTopology {
    interface: String,
    server: RawServer,
    router: RawRouter,
    attacker: RawAttacker,
}

/// The network topology an attack runs against: the victim server, the
/// NAT router, and this host's own attacker-side address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub interface: String,
    pub server_addr: Address,
    pub router_ip: u32,
    pub attacker_ip: u32,
    pub ttl_drop: u8,
}

impl Topology {
    /// Parse a topology from a YAML file on disk.
    pub fn parse(path: impl AsRef<Path>) -> Result<Topology, TopologyError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let contents = fs::read_to_string(path).map_err(|e| TopologyError::Read {
            path: path_str.clone(),
            message: e.to_string(),
        })?;

        let raw: RawTopology =
            serde_yaml::from_str(&contents).map_err(|e| TopologyError::Parse {
                path: path_str.clone(),
                message: e.to_string(),
            })?;

        let server_ip = parse_dotted_quad("server.ip", &raw.server.ip)?;
        let router_ip = parse_dotted_quad("router.ip", &raw.router.ip)?;
        let attacker_ip = parse_dotted_quad("attacker.ip", &raw.attacker.ip)?;

        Ok(Topology {
            interface: raw.interface,
            server_addr: Address::new(server_ip, raw.server.port),
            router_ip,
            attacker_ip,
            ttl_drop: raw.server.ttl_drop,
        })
    }
}

/// Parse a dotted-quad IPv4 address into host-order `u32`, rejecting
/// non-digit characters, empty octets, octets > 255, missing separators,
/// or extra trailing characters.
fn parse_dotted_quad(field: &str, value: &str) -> Result<u32, TopologyError> {
    let invalid = || TopologyError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    };

    let octets: Vec<&str> = value.split('.').collect();
    if octets.len() != 4 {
        return Err(invalid());
    }

    let mut ip: u32 = 0;
    for octet_str in octets {
        if octet_str.is_empty() || !octet_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let octet: u32 = octet_str.parse().map_err(|_| invalid())?;
        if octet > 255 {
            return Err(invalid());
        }
        ip = (ip << 8) | octet;
    }

    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_topology(contents: &str) -> tempfile_path::TempFile {
        tempfile_path::TempFile::new(contents)
    }

    // A tiny ad-hoc tempfile helper so tests don't need an extra
    // dev-dependency beyond the standard library.
    mod tempfile_path {
        use std::fs;
        use std::io::Write;
        use std::path::PathBuf;

        pub struct TempFile {
            pub path: PathBuf,
        }

        impl TempFile {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!(
                    "harbinger-topology-test-{}-{}.yaml",
                    std::process::id(),
                    contents.len()
                ));
                let mut f = fs::File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempFile {
            fn drop(&mut self) {
                let _ = fs::remove_file(&self.path);
            }
        }
    }

    const VALID: &str = r#"
interface: tun0
server:
  ip: 10.244.129.5
  port: 2440
  ttl-drop: 3
router:
  ip: 10.244.129.4
attacker:
  ip: 10.244.1.128
"#;

    #[test]
    fn parses_valid_topology() {
        let f = write_topology(VALID);
        let top = Topology::parse(&f.path).unwrap();
        assert_eq!(top.interface, "tun0");
        assert_eq!(top.server_addr, Address::new(0x0af48105, 2440));
        assert_eq!(top.router_ip, 0x0af48104);
        assert_eq!(top.attacker_ip, 0x0af40180);
        assert_eq!(top.ttl_drop, 3);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Topology::parse("/nonexistent/path/topology.yaml").unwrap_err();
        assert!(matches!(err, TopologyError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let f = write_topology("not: [valid, yaml");
        let err = Topology::parse(&f.path).unwrap_err();
        assert!(matches!(err, TopologyError::Parse { .. }));
    }

    #[test]
    fn rejects_non_digit_octet() {
        assert!(matches!(
            parse_dotted_quad("x", "10.24a.1.1"),
            Err(TopologyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn rejects_empty_octet() {
        assert!(matches!(
            parse_dotted_quad("x", "10..1.1"),
            Err(TopologyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn rejects_octet_over_255() {
        assert!(matches!(
            parse_dotted_quad("x", "10.256.1.1"),
            Err(TopologyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            parse_dotted_quad("x", "10.1.1"),
            Err(TopologyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn rejects_extra_characters() {
        assert!(matches!(
            parse_dotted_quad("x", "10.1.1.1extra"),
            Err(TopologyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn accepts_canonical_address() {
        assert_eq!(parse_dotted_quad("x", "10.244.1.128").unwrap(), 0x0af40180);
    }
}
