//! Source address allow-lists for webhook providers.
//!
//! Entries are either literal addresses, matched as exact strings, or IPv4
//! CIDR blocks matched on the first `prefix_len` bits. The observed address
//! comes from a forwarded-for header; only the first hop is evaluated.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Error parsing an allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressPatternError {
    #[error("empty allow-list entry")]
    Empty,

    #[error("invalid CIDR network address: {0}")]
    InvalidNetwork(String),

    #[error("invalid CIDR prefix length: {0}")]
    InvalidPrefix(String),
}

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPattern {
    Literal(String),
    Cidr { network: Ipv4Addr, prefix_len: u8 },
}

impl AddressPattern {
    /// Whether `address` (already reduced to a single hop) matches.
    #[must_use]
    pub fn matches(&self, address: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == address,
            Self::Cidr {
                network,
                prefix_len,
            } => match address.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    let mask = prefix_mask(*prefix_len);
                    u32::from(ip) & mask == u32::from(*network) & mask
                }
                Err(_) => false,
            },
        }
    }
}

fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

impl FromStr for AddressPattern {
    type Err = AddressPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressPatternError::Empty);
        }

        let Some((network, prefix)) = s.split_once('/') else {
            return Ok(Self::Literal(s.to_string()));
        };

        let network = network
            .parse::<Ipv4Addr>()
            .map_err(|_| AddressPatternError::InvalidNetwork(network.to_string()))?;
        let prefix_len = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| AddressPatternError::InvalidPrefix(prefix.to_string()))?;

        Ok(Self::Cidr {
            network,
            prefix_len,
        })
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => f.write_str(literal),
            Self::Cidr {
                network,
                prefix_len,
            } => write!(f, "{network}/{prefix_len}"),
        }
    }
}

/// Allow-list for one provider. An empty list admits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    patterns: Vec<AddressPattern>,
}

impl AllowList {
    #[must_use]
    pub fn new(patterns: Vec<AddressPattern>) -> Self {
        Self { patterns }
    }

    /// Parse a comma-separated list of literals and CIDR blocks.
    ///
    /// # Errors
    ///
    /// Returns the first entry that fails to parse.
    pub fn parse(list: &str) -> Result<Self, AddressPatternError> {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse::<AddressPattern>)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    #[must_use]
    pub fn patterns(&self) -> &[AddressPattern] {
        &self.patterns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the observed forwarded-for value is allowed.
    #[must_use]
    pub fn is_allowed(&self, observed: Option<&str>) -> bool {
        is_allowed(self, observed)
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{pattern}")?;
        }
        Ok(())
    }
}

/// First hop of a forwarded-for chain, trimmed. An IPv4-mapped IPv6 peer
/// (`::ffff:a.b.c.d`) is reduced to its IPv4 form.
#[must_use]
pub fn first_hop(observed: &str) -> Option<&str> {
    let hop = observed.split(',').next()?.trim();
    let hop = hop.strip_prefix("::ffff:").unwrap_or(hop);
    (!hop.is_empty()).then_some(hop)
}

/// Whether `observed` is allowed by `allow_list`. Absent addresses never are.
#[must_use]
pub fn is_allowed(allow_list: &AllowList, observed: Option<&str>) -> bool {
    let Some(address) = observed.and_then(first_hop) else {
        return false;
    };
    allow_list.patterns.iter().any(|p| p.matches(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(s: &str) -> AllowList {
        AllowList::parse(s).unwrap()
    }

    #[test]
    fn test_cidr_sixteen() {
        let allow = list("190.112.0.0/16");
        assert!(is_allowed(&allow, Some("190.112.1.1")));
        assert!(is_allowed(&allow, Some("190.112.255.254")));
        assert!(!is_allowed(&allow, Some("190.113.1.1")));
    }

    #[test]
    fn test_cidr_non_octet_prefix() {
        let allow = list("10.0.0.0/12");
        assert!(is_allowed(&allow, Some("10.15.200.1")));
        assert!(!is_allowed(&allow, Some("10.16.0.1")));
    }

    #[test]
    fn test_cidr_host_bits_in_network_ignored() {
        let allow = list("200.1.2.3/8");
        assert!(is_allowed(&allow, Some("200.99.99.99")));
    }

    #[test]
    fn test_cidr_zero_and_thirty_two() {
        assert!(is_allowed(&list("0.0.0.0/0"), Some("8.8.8.8")));
        let exact = list("54.226.73.99/32");
        assert!(is_allowed(&exact, Some("54.226.73.99")));
        assert!(!is_allowed(&exact, Some("54.226.73.98")));
    }

    #[test]
    fn test_literal_exact_match() {
        let allow = list("54.226.73.99, 54.241.27.196");
        assert!(is_allowed(&allow, Some("54.241.27.196")));
        assert!(!is_allowed(&allow, Some("54.241.27.19")));
    }

    #[test]
    fn test_first_hop_only() {
        let allow = list("190.112.0.0/16");
        assert!(is_allowed(&allow, Some("190.112.1.1, 10.0.0.1")));
        assert!(!is_allowed(&allow, Some("10.0.0.1, 190.112.1.1")));
    }

    #[test]
    fn test_absent_address_rejected() {
        let allow = list("0.0.0.0/0");
        assert!(!is_allowed(&allow, None));
        assert!(!is_allowed(&allow, Some("")));
        assert!(!is_allowed(&allow, Some(" , 1.2.3.4")));
    }

    #[test]
    fn test_mapped_ipv6_peer() {
        assert!(is_allowed(&list("127.0.0.0/8"), Some("::ffff:127.0.0.1")));
    }

    #[test]
    fn test_garbage_address_does_not_match_cidr() {
        assert!(!is_allowed(&list("190.112.0.0/16"), Some("190.112.x.y")));
    }

    #[test]
    fn test_empty_list_admits_nothing() {
        let allow = AllowList::parse("").unwrap();
        assert!(allow.is_empty());
        assert!(!is_allowed(&allow, Some("1.2.3.4")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            AllowList::parse("1.2.3.0/33"),
            Err(AddressPatternError::InvalidPrefix(_))
        ));
        assert!(matches!(
            AllowList::parse("1.2.3/8"),
            Err(AddressPatternError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_display_round_trips() {
        let allow = list("54.226.73.99,190.112.0.0/16");
        assert_eq!(allow.to_string(), "54.226.73.99,190.112.0.0/16");
    }
}
