use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};
use std::net::Ipv4Addr;

/// Largest network a single target entry may expand to.
pub const MAX_CIDR_HOSTS: u64 = 1 << 24;

/// Expand target entries, turning CIDR notation into individual host addresses.
///
/// Entries without a `/` are passed through untouched; invalid addresses are left for the
/// engine to report as per-attempt failures.
pub fn expand_targets(entries: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.trim();
        if !entry.contains('/') {
            out.push(entry.to_string());
            continue;
        }
        let net: IpNet = entry
            .parse()
            .with_context(|| format!("invalid CIDR target: {entry}"))?;
        match net {
            IpNet::V4(n4) => {
                let hosts = 1u64 << (32 - u32::from(n4.prefix_len()));
                if hosts > MAX_CIDR_HOSTS {
                    bail!("CIDR target too large: {entry} ({hosts} addresses)");
                }
                out.extend(expand_ipv4net_hosts(n4).into_iter().map(|ip| ip.to_string()));
            }
            IpNet::V6(_) => bail!("IPv6 CIDR targets are not supported: {entry}"),
        }
    }
    Ok(out)
}

/// Host addresses of an IPv4 network.
///
/// Network and broadcast addresses are excluded, except for /31 and /32 where every
/// address is a host.
pub fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_small_cidr_excludes_network_and_broadcast() {
        let net = Ipv4Net::new(Ipv4Addr::new(192, 168, 1, 0), 30).unwrap();
        assert_eq!(
            expand_ipv4net_hosts(net),
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn single_host_network() {
        let net = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 9), 32).unwrap();
        assert_eq!(expand_ipv4net_hosts(net), vec![Ipv4Addr::new(10, 0, 0, 9)]);
    }

    #[test]
    fn plain_entries_pass_through() {
        let entries = vec!["10.0.0.1".to_string(), "bogus".to_string()];
        assert_eq!(expand_targets(&entries).unwrap(), entries);
    }

    #[test]
    fn oversized_and_v6_rejected() {
        assert!(expand_targets(&["10.0.0.0/7".to_string()]).is_err());
        assert!(expand_targets(&["fe80::/64".to_string()]).is_err());
        assert!(expand_targets(&["10.0.0.0/33".to_string()]).is_err());
    }
}
