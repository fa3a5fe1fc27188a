// botgate/src/detectors/ip.rs
//
// Remote-address classification against curated CIDR tables.
//
// The tables are a deliberately small operational subset — the full feeds
// arrive via configuration in deployments that care. Matching emits derived
// properties only; the address itself never reaches the blackboard.

use std::net::IpAddr;

use ipnet::IpNet;
use once_cell::sync::Lazy;

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Ip;

// (cidr, asn, org) — hosting / cloud ranges
const DATACENTER_TABLE: &[(&str, u32, &str)] = &[
    ("3.0.0.0/9", 16509, "amazon aws"),
    ("13.52.0.0/14", 16509, "amazon aws"),
    ("18.128.0.0/9", 16509, "amazon aws"),
    ("52.0.0.0/10", 16509, "amazon aws"),
    ("34.64.0.0/10", 15169, "google cloud"),
    ("35.184.0.0/13", 15169, "google cloud"),
    ("104.196.0.0/14", 15169, "google cloud"),
    ("20.33.0.0/16", 8075, "microsoft azure"),
    ("40.64.0.0/10", 8075, "microsoft azure"),
    ("104.131.0.0/16", 14061, "digitalocean"),
    ("138.197.0.0/16", 14061, "digitalocean"),
    ("159.89.0.0/16", 14061, "digitalocean"),
    ("165.227.0.0/16", 14061, "digitalocean"),
    ("95.216.0.0/15", 24940, "hetzner"),
    ("135.181.0.0/16", 24940, "hetzner"),
    ("51.38.0.0/16", 16276, "ovh"),
    ("51.68.0.0/16", 16276, "ovh"),
    ("139.162.0.0/16", 63949, "linode"),
    ("172.104.0.0/15", 63949, "linode"),
    ("45.76.0.0/16", 20473, "vultr"),
    ("149.28.0.0/16", 20473, "vultr"),
];

const VPN_TABLE: &[(&str, &str)] = &[
    ("185.159.156.0/22", "protonvpn"),
    ("146.70.0.0/16", "m247"),
    ("37.19.200.0/21", "datacamp vpn"),
    ("89.187.160.0/19", "cdn77 vpn"),
];

const PRIVATE_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "100.64.0.0/10",
    "fc00::/7",
    "fe80::/10",
    "::1/128",
];

struct RangeTables {
    datacenter: Vec<(IpNet, u32, &'static str)>,
    vpn: Vec<(IpNet, &'static str)>,
    private: Vec<IpNet>,
}

static TABLES: Lazy<RangeTables> = Lazy::new(|| RangeTables {
    datacenter: DATACENTER_TABLE
        .iter()
        .filter_map(|(c, asn, org)| c.parse().ok().map(|net| (net, *asn, *org)))
        .collect(),
    vpn: VPN_TABLE
        .iter()
        .filter_map(|(c, org)| c.parse().ok().map(|net| (net, *org)))
        .collect(),
    private: PRIVATE_RANGES.iter().filter_map(|c| c.parse().ok()).collect(),
});

fn datacenter_match(addr: IpAddr) -> Option<(u32, &'static str)> {
    TABLES
        .datacenter
        .iter()
        .find(|(net, ..)| net.contains(&addr))
        .map(|(_, asn, org)| (*asn, *org))
}

fn vpn_match(addr: IpAddr) -> Option<&'static str> {
    TABLES.vpn.iter().find(|(net, _)| net.contains(&addr)).map(|(_, org)| *org)
}

fn is_private(addr: IpAddr) -> bool {
    TABLES.private.iter().any(|net| net.contains(&addr))
}

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let addr = ctx.fingerprint.remote_addr;
    let sink = &ctx.sink;
    let name = KIND.name();

    let datacenter = datacenter_match(addr);
    let vpn = vpn_match(addr);
    let private = is_private(addr);

    sink.emit(name, "request.ip.is_datacenter", datacenter.is_some());
    sink.emit(name, "request.ip.is_private", private);
    sink.emit(name, "request.ip.is_vpn", vpn.is_some());
    sink.emit(
        name,
        "request.ip.asn",
        datacenter.map(|(asn, _)| asn as i64).unwrap_or(0),
    );

    let signals = vec![
        "request.ip.is_datacenter".into(),
        "request.ip.is_private".into(),
        "request.ip.is_vpn".into(),
        "request.ip.asn".into(),
    ];

    if let Some((asn, org)) = datacenter {
        return Ok(vec![Contribution::bot(
            KIND,
            manifest.param_f64("datacenter_score", 0.45),
            manifest.weight("datacenter", 0.9),
            manifest.confidence("datacenter", 0.85),
            format!("datacenter address (AS{asn} {org})"),
        )
        .with_signals(signals)]);
    }

    if let Some(org) = vpn {
        return Ok(vec![Contribution::bot(
            KIND,
            manifest.param_f64("vpn_score", 0.3),
            manifest.weight("vpn", 0.8),
            manifest.confidence("vpn", 0.7),
            format!("known VPN egress ({org})"),
        )
        .with_signals(signals)]);
    }

    if private {
        // Internal traffic: signal only, no verdict pressure.
        return Ok(Vec::new());
    }

    Ok(vec![Contribution::human(
        KIND,
        manifest.param_f64("clean_human_score", 0.2),
        manifest.weight("clean", 1.0),
        manifest.confidence("clean", 0.6),
        "residential or unlisted address space",
    )
    .with_signals(signals)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    async fn run(addr: [u8; 4]) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("ip").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let mut fp = RequestFingerprint::synthetic("ua", "/");
        fp.remote_addr = IpAddr::V4(Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]));
        let ctx = DetectionContext::new(fp, "sig".into(), Duration::from_millis(150));
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn datacenter_address_flags_and_scores() {
        let (ctx, contributions) = run([104, 131, 7, 7]).await;
        assert!(ctx.sink.bool("request.ip.is_datacenter"));
        assert_eq!(ctx.sink.int("request.ip.asn"), 14061);
        assert!(contributions[0].weighted_score > 0.0);
        assert!(contributions[0].rationale.contains("digitalocean"));
    }

    #[tokio::test]
    async fn documentation_range_is_clean() {
        let (ctx, contributions) = run([203, 0, 113, 5]).await;
        assert!(!ctx.sink.bool("request.ip.is_datacenter"));
        assert!(!ctx.sink.bool("request.ip.is_vpn"));
        assert!(contributions[0].weighted_score < 0.0);
    }

    #[tokio::test]
    async fn private_address_signals_without_contribution() {
        let (ctx, contributions) = run([192, 168, 1, 20]).await;
        assert!(ctx.sink.bool("request.ip.is_private"));
        assert!(contributions.is_empty());
    }

    #[tokio::test]
    async fn raw_address_never_emitted() {
        let (ctx, _) = run([104, 131, 7, 7]).await;
        for key in ctx.sink.keys() {
            if let Some(crate::signal::Signal::Str(s)) = ctx.sink.get(&key) {
                assert!(!s.contains("104.131"), "raw address leaked via {key}");
            }
        }
    }
}
