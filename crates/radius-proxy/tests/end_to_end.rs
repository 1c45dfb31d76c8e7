//! Proxying through a live and a canary tier over real UDP sockets

use radius_proto::{
    Attribute, AttributeType, Code, EapCode, EapPacket, EapType, Packet,
    calculate_response_authenticator, generate_request_authenticator, verify_response_authenticator,
};
use radius_proxy::{RadiusConfig, RadiusServer, StateLookup};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const SECRET: &[u8] = b"123456";
const CALLING: &str = "02-00-00-00-00-01";
const CALLED: &str = "AA-BB-CC-DD-EE-FF:carrier-wifi";

/// Upstream authentication tier running a two-round EAP-AKA' exchange
///
/// Identity responses get an Access-Challenge, anything else an
/// Access-Accept. Every reply carries a Reply-Message naming the tier.
async fn upstream_tier(tier: &'static str) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let request = Packet::decode(&buf[..len]).unwrap();
            let eap = EapPacket::from_radius(&request).unwrap().unwrap();

            let mut reply = if eap.eap_type() == Some(EapType::Identity) {
                let mut challenge = Packet::new(Code::AccessChallenge, request.identifier, [0u8; 16]);
                let eap_request =
                    EapPacket::new(EapCode::Request, eap.identifier + 1, Some(EapType::AkaPrime), vec![1]);
                challenge.add_attribute(
                    Attribute::new(AttributeType::EapMessage as u8, eap_request.to_bytes()).unwrap(),
                );
                challenge
            } else {
                let mut accept = Packet::new(Code::AccessAccept, request.identifier, [0u8; 16]);
                let success = EapPacket::new(EapCode::Success, eap.identifier, None, vec![]);
                accept.add_attribute(
                    Attribute::new(AttributeType::EapMessage as u8, success.to_bytes()).unwrap(),
                );
                accept
            };
            reply.add_attribute(Attribute::string(AttributeType::ReplyMessage as u8, tier).unwrap());
            reply.authenticator =
                calculate_response_authenticator(&reply, &request.authenticator, SECRET).unwrap();

            socket.send_to(&reply.encode().unwrap(), peer).await.unwrap();
        }
    });

    addr
}

/// `live_port` always lands on the live tier and `canary_port` on the
/// canary tier: the canary takes every draw but only routes `canary_port`.
fn proxy_config(live: SocketAddr, canary: SocketAddr, filters: serde_json::Value) -> RadiusConfig {
    let listener = |name: &str| {
        json!({
            "name": name,
            "type": "udp",
            "modules": [
                { "name": "log", "config": { "level": "debug", "fields": ["User-Name"] } },
                { "name": "proxy", "config": { "timeoutMs": 1000, "retries": 1 } },
                { "name": "eap", "config": { "maxRounds": 10 } },
                { "name": "respond" }
            ],
            "extra": { "address": "127.0.0.1", "port": 0 }
        })
    };

    let value = json!({
        "server": {
            "secret": "123456",
            "dedupWindow": "5s",
            "loadBalance": {
                "serviceTiers": [
                    { "name": "live_v1", "upstreamHosts": [live.to_string()] },
                    { "name": "canary_v2", "upstreamHosts": [canary.to_string()] }
                ],
                "liveTier": { "tierRoutes": [
                    { "listener": "live_port", "serviceTier": "live_v1" },
                    { "listener": "canary_port", "serviceTier": "live_v1" }
                ]},
                "canaries": [{
                    "name": "c1",
                    "trafficSlicePercent": 100,
                    "routing": { "tierRoutes": [{ "listener": "canary_port", "serviceTier": "canary_v2" }] }
                }],
                "defaultTier": "live_v1"
            },
            "listeners": [listener("live_port"), listener("canary_port")],
            "filters": filters
        }
    });

    RadiusConfig::from_json(&value.to_string()).unwrap()
}

async fn start(config: RadiusConfig) -> (Arc<RadiusServer>, Vec<(String, SocketAddr)>) {
    let server = Arc::new(RadiusServer::from_config(config.server).await.unwrap());
    let addrs = server.local_addrs().unwrap();

    let running = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = running.run().await;
    });

    (server, addrs)
}

fn addr_of(addrs: &[(String, SocketAddr)], name: &str) -> SocketAddr {
    addrs.iter().find(|(n, _)| n == name).map(|(_, a)| *a).unwrap()
}

fn access_request(identifier: u8, eap: EapPacket) -> Packet {
    let mut packet = Packet::new(Code::AccessRequest, identifier, generate_request_authenticator());
    packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "0310150123456789@wlan").unwrap());
    packet.add_attribute(Attribute::string(AttributeType::CallingStationId as u8, CALLING).unwrap());
    packet.add_attribute(Attribute::string(AttributeType::CalledStationId as u8, CALLED).unwrap());
    packet.add_attribute(Attribute::new(AttributeType::EapMessage as u8, eap.to_bytes()).unwrap());
    packet
}

async fn exchange(client: &UdpSocket, proxy: SocketAddr, request: &Packet) -> Option<Packet> {
    client.send_to(&request.encode().unwrap(), proxy).await.unwrap();

    let mut buf = [0u8; 4096];
    let (len, _) = timeout(Duration::from_secs(3), client.recv_from(&mut buf)).await.ok()?.unwrap();
    let reply = Packet::decode(&buf[..len]).unwrap();
    assert!(verify_response_authenticator(&reply, &request.authenticator, SECRET));
    Some(reply)
}

fn reply_message(packet: &Packet) -> String {
    packet
        .find_attribute(AttributeType::ReplyMessage as u8)
        .unwrap()
        .as_string()
        .unwrap()
}

#[tokio::test]
async fn test_eap_exchange_through_live_and_canary() {
    let live = upstream_tier("live_v1").await;
    let canary = upstream_tier("canary_v2").await;
    let (server, addrs) = start(proxy_config(live, canary, json!([]))).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let key = format!("eap__{}__{}", CALLING, CALLED);

    for (listener, tier) in [("live_port", "live_v1"), ("canary_port", "canary_v2")] {
        let proxy = addr_of(&addrs, listener);

        // Round 1: identity, answered with a challenge
        let request = access_request(1, EapPacket::identity_response(0, "0310150123456789@wlan"));
        let reply = exchange(&client, proxy, &request).await.expect("challenge");
        assert_eq!(reply.code, Code::AccessChallenge);
        assert_eq!(reply.identifier, 1);
        assert_eq!(reply_message(&reply), tier);

        let StateLookup::Found(state) = server.state().get(&key).await.unwrap() else {
            panic!("challenge should leave EAP state behind");
        };
        assert_eq!(state.rounds, 1);
        assert_eq!(state.eap_type, Some(EapType::AkaPrime.as_u8()));
        assert_eq!(state.last_identifier, Some(1));

        // Round 2: method response, accepted
        let method = EapPacket::new(EapCode::Response, 1, Some(EapType::AkaPrime), vec![9, 9]);
        let request = access_request(2, method);
        let reply = exchange(&client, proxy, &request).await.expect("accept");
        assert_eq!(reply.code, Code::AccessAccept);
        assert_eq!(reply_message(&reply), tier);

        assert_eq!(server.state().get(&key).await.unwrap(), StateLookup::NotFound);
    }

    let stats = server.router().stats();
    assert!(stats.iter().all(|tier| tier.selections == 2));

    let counters = server.counters().get("radius_request");
    assert_eq!(counters.started, 4);
    assert_eq!(counters.succeeded, 4);
}

#[tokio::test]
async fn test_dedup_filter_drops_retransmission() {
    let live = upstream_tier("live_v1").await;
    let canary = upstream_tier("canary_v2").await;
    let (server, addrs) = start(proxy_config(live, canary, json!(["dedup"]))).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let proxy = addr_of(&addrs, "live_port");

    let request = access_request(7, EapPacket::identity_response(0, "user@wlan"));
    assert!(exchange(&client, proxy, &request).await.is_some());

    // Same identifier and authenticator from the same NAS
    client.send_to(&request.encode().unwrap(), proxy).await.unwrap();
    let mut buf = [0u8; 4096];
    assert!(timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await.is_err());

    let counters = server.counters().get("radius_request");
    assert_eq!(counters.failed.get("filtered"), Some(&1));
}

#[tokio::test]
async fn test_silent_upstream_is_rejected() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();

    let value = json!({
        "server": {
            "secret": "123456",
            "dedupWindow": 10000,
            "loadBalance": {
                "serviceTiers": [{ "name": "live_v1", "upstreamHosts": [silent_addr.to_string()] }],
                "defaultTier": "live_v1"
            },
            "listeners": [{
                "name": "auth",
                "type": "udp",
                "modules": [{ "name": "proxy", "config": { "timeoutMs": 50, "retries": 0 } }],
                "extra": { "address": "127.0.0.1", "port": 0 }
            }]
        }
    });
    let (_server, addrs) = start(RadiusConfig::from_json(&value.to_string()).unwrap()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut request = access_request(3, EapPacket::identity_response(0, "user@wlan"));
    request.add_attribute(Attribute::new(AttributeType::ProxyState as u8, vec![0xca, 0xfe]).unwrap());

    let reply = exchange(&client, addr_of(&addrs, "auth"), &request).await.expect("reject");
    assert_eq!(reply.code, Code::AccessReject);
    assert_eq!(reply.identifier, 3);
    assert_eq!(
        reply.find_attribute(AttributeType::ProxyState as u8).unwrap().value,
        vec![0xca, 0xfe]
    );
    drop(silent);
}

#[tokio::test]
async fn test_garbage_datagram_is_ignored() {
    let live = upstream_tier("live_v1").await;
    let canary = upstream_tier("canary_v2").await;
    let (server, addrs) = start(proxy_config(live, canary, json!([]))).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let proxy = addr_of(&addrs, "live_port");

    client.send_to(&[1, 2, 3], proxy).await.unwrap();

    // The listener keeps serving afterwards
    let request = access_request(1, EapPacket::identity_response(0, "user@wlan"));
    assert!(exchange(&client, proxy, &request).await.is_some());

    let counters = server.counters().get("radius_request");
    assert_eq!(counters.failed.get("decode_error"), Some(&1));
}
