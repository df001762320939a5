use std::net::Ipv4Addr;
use std::time::Duration;

use fieldnet::errors::FleetError;
use fieldnet::scanner::{is_likely_gateway, prioritize_targets, scan_subnet_for_ssh, ScanOptions};

use crate::fakes::FakeProber;

fn options() -> ScanOptions {
    ScanOptions {
        timeout: Duration::from_millis(50),
        concurrency: 4,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_scan_finds_only_answering_hosts() {
    let prober = FakeProber::with_up(&["10.0.100.1", "10.0.100.5", "10.0.100.6", "10.0.100.7"]);
    let mut found = scan_subnet_for_ssh(prober, "10.0.100.0/29", &options()).await.unwrap();
    found.sort();
    // .7 is the broadcast address of the /29 and is never probed
    assert_eq!(
        found,
        vec![
            Ipv4Addr::new(10, 0, 100, 1),
            Ipv4Addr::new(10, 0, 100, 5),
            Ipv4Addr::new(10, 0, 100, 6)
        ]
    );
}

#[tokio::test]
async fn test_scan_edge_cases() {
    let prober = FakeProber::with_up(&["10.0.100.9"]);
    assert!(scan_subnet_for_ssh(prober.clone(), "10.0.100.9/32", &options())
        .await
        .unwrap()
        .is_empty());

    let err = scan_subnet_for_ssh(prober, "10.0.100.0/33", &options()).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));
}

#[test]
fn test_gateways_go_last_in_discovery_order() {
    let ip = |last: u8| Ipv4Addr::new(10, 0, 100, last);
    let found = vec![ip(254), ip(40), ip(1), ip(12), ip(99)];
    let ordered = prioritize_targets(&found);
    assert_eq!(ordered, vec![ip(40), ip(12), ip(99), ip(254), ip(1)]);

    let first_gateway = ordered.iter().position(|ip| is_likely_gateway(*ip)).unwrap();
    assert!(ordered[first_gateway..].iter().all(|ip| is_likely_gateway(*ip)));
    assert!(ordered[..first_gateway].iter().all(|ip| !is_likely_gateway(*ip)));
}
