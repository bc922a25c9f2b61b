use powerocean::config::MqttChannel;
use powerocean::mqtt::{DecodeError, TopicSet, decode_payload, topic_for};
use serde_json::json;

#[test]
fn params_object_is_the_update() {
    let fields = decode_payload(
        br#"{"id":"1","version":"1.0","timestamp":1718000000000,
             "params":{"bpSoc":81,"pcsAPhase":{"vol":229.8}}}"#,
    )
    .unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields["bpSoc"], json!(81));
    assert_eq!(fields["pcsAPhase"]["vol"], json!(229.8));
}

#[test]
fn bare_object_is_the_update() {
    let fields = decode_payload(br#"{"sysGridPwr": 312.4}"#).unwrap();
    assert_eq!(fields["sysGridPwr"], json!(312.4));
}

#[test]
fn malformed_payloads_are_rejected() {
    assert!(matches!(
        decode_payload(b"{\"bpSoc\":"),
        Err(DecodeError::InvalidJson(_))
    ));
    assert!(matches!(
        decode_payload(&[0xc3, 0x28]),
        Err(DecodeError::InvalidUtf8(_))
    ));
    assert_eq!(
        decode_payload(b"\"text\""),
        Err(DecodeError::NotAnObject("string"))
    );
    assert_eq!(
        decode_payload(br#"{"params":[1]}"#),
        Err(DecodeError::NotAnObject("array"))
    );
    assert_eq!(decode_payload(br#"{"params":{}}"#), Err(DecodeError::Empty));
    assert_eq!(decode_payload(b"   "), Err(DecodeError::Empty));
}

#[test]
fn device_topics() {
    assert_eq!(
        topic_for("open-acct", "HJ31", MqttChannel::Quota),
        "/open/open-acct/HJ31/quota"
    );
    let set = TopicSet::new("open-acct", "HJ31", &MqttChannel::all());
    assert_eq!(set.len(), 6);
    assert!(set.topics().any(|t| t == "/open/open-acct/HJ31/set_reply"));
    assert_eq!(
        set.channel_of("/open/open-acct/HJ31/get_reply"),
        Some(MqttChannel::GetReply)
    );
    assert_eq!(set.channel_of("/open/other/HJ31/quota"), None);
}
