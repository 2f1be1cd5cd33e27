use std::net::Ipv4Addr;
use url::{Host, Url};

/// Coarse network a proxy lives in, used to move away from a failing path
///
/// IPv4 addresses use their classful network id (`10`, `172.16`,
/// `192.168.1`); hostnames use their last two labels; anything else is
/// compared verbatim.
pub fn network_class(proxy: &str) -> String {
    let parsed = Url::parse(proxy)
        .ok()
        .filter(|url| url.host().is_some())
        .or_else(|| Url::parse(&format!("http://{}", proxy)).ok());

    match parsed.as_ref().and_then(|url| url.host()) {
        Some(Host::Ipv4(addr)) => ipv4_class(addr),
        Some(Host::Domain(name)) => {
            // Non-special schemes such as socks5 leave IPv4 hosts unparsed
            if let Ok(addr) = name.parse::<Ipv4Addr>() {
                return ipv4_class(addr);
            }
            let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
            let start = labels.len().saturating_sub(2);
            labels[start..].join(".").to_lowercase()
        }
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => proxy.to_string(),
    }
}

fn ipv4_class(addr: Ipv4Addr) -> String {
    let [a, b, c, _] = addr.octets();
    match a {
        0..=127 => a.to_string(),
        128..=191 => format!("{}.{}", a, b),
        _ => format!("{}.{}.{}", a, b, c),
    }
}
