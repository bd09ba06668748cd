//! Topic scheme for the RPC bridge.
//!
//! All traffic lives under `/rpc/v1`:
//!
//! - request: `/rpc/v1/<driver>/<service>/<method>/<client-id>`
//! - reply: `<request-topic>/reply`
//! - availability sentinel (retained): `/rpc/v1/<app>/<service>/<method>`
//! - server subscription: `<sentinel>/+` (one wildcard = caller id)

/// Fixed root of the topic tree.
pub const RPC_PREFIX: &str = "/rpc/v1";

/// Reply suffix appended to a request topic.
pub const REPLY_SUFFIX: &str = "reply";

/// Routing identifiers decoded from an inbound request topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRoute {
    pub service: String,
    pub method: String,
    pub caller: String,
}

/// Topic an outbound call is published on.
pub fn request_topic(driver: &str, service: &str, method: &str, client_id: &str) -> String {
    format!("{RPC_PREFIX}/{driver}/{service}/{method}/{client_id}")
}

/// Topic a reply to `request` is published on.
pub fn reply_topic(request: &str) -> String {
    format!("{request}/{REPLY_SUFFIX}")
}

/// Retained availability sentinel for an advertised (service, method) pair.
pub fn service_base(app: &str, service: &str, method: &str) -> String {
    format!("{RPC_PREFIX}/{app}/{service}/{method}")
}

/// Subscription pattern covering all callers of one (service, method) pair.
pub fn service_subscription(app: &str, service: &str, method: &str) -> String {
    format!("{}/+", service_base(app, service, method))
}

/// Pattern matching every reply addressed to `client_id`, whatever the
/// driver/service/method of the originating call.
pub fn client_reply_pattern(client_id: &str) -> String {
    format!("{RPC_PREFIX}/+/+/+/{client_id}/{REPLY_SUFFIX}")
}

/// MQTT-style topic matching with `+` (one segment) and `#` (rest).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Decode (service, method, caller) from an inbound request topic rooted at
/// `/rpc/v1/<app>`. Returns `None` for topics outside this app's tree.
pub fn parse_request(app: &str, topic: &str) -> Option<RequestRoute> {
    let rest = topic
        .strip_prefix(RPC_PREFIX)?
        .strip_prefix('/')?
        .strip_prefix(app)?
        .strip_prefix('/')?;
    let mut parts = rest.split('/');
    let service = parts.next()?.to_owned();
    let method = parts.next()?.to_owned();
    let caller = parts.next()?.to_owned();
    if parts.next().is_some() {
        return None;
    }
    Some(RequestRoute {
        service,
        method,
        caller,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn builds_request_and_reply_topics() {
        let topic = request_topic("wb-mqtt-serial", "port", "Load", "abc123");
        assert_eq!(topic, "/rpc/v1/wb-mqtt-serial/port/Load/abc123");
        assert_eq!(reply_topic(&topic), "/rpc/v1/wb-mqtt-serial/port/Load/abc123/reply");
    }

    #[rstest]
    #[case("/rpc/v1/+/+/+/me/reply", "/rpc/v1/gw/port/Load/me/reply", true)]
    #[case("/rpc/v1/+/+/+/me/reply", "/rpc/v1/gw/port/Load/other/reply", false)]
    #[case("/rpc/v1/+/+/+/me/reply", "/rpc/v1/gw/port/Load/me", false)]
    #[case("/rpc/v1/app/svc/m/+", "/rpc/v1/app/svc/m/42", true)]
    #[case("/rpc/v1/app/svc/m/+", "/rpc/v1/app/svc/m/42/reply", false)]
    #[case("/rpc/#", "/rpc/v1/anything/at/all", true)]
    fn matches_like_a_broker(#[case] pattern: &str, #[case] topic: &str, #[case] expected: bool) {
        assert_eq!(topic_matches(pattern, topic), expected);
    }

    #[test]
    fn parses_own_request_topics() {
        let route = parse_request("busbridge", "/rpc/v1/busbridge/bus_scan/scan/42").unwrap();
        assert_eq!(route.service, "bus_scan");
        assert_eq!(route.method, "scan");
        assert_eq!(route.caller, "42");
    }

    #[test]
    fn rejects_foreign_and_malformed_topics() {
        assert!(parse_request("busbridge", "/rpc/v1/other-app/svc/m/42").is_none());
        assert!(parse_request("busbridge", "/rpc/v1/busbridge/svc/m").is_none());
        assert!(parse_request("busbridge", "/rpc/v1/busbridge/svc/m/42/reply").is_none());
    }
}
