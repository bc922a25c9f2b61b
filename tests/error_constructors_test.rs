use powerocean::error::PowerOceanError;

#[test]
fn error_constructors_map_to_variants() {
    assert!(matches!(
        PowerOceanError::config("x"),
        PowerOceanError::Config { .. }
    ));
    assert!(matches!(
        PowerOceanError::network("x"),
        PowerOceanError::Network { .. }
    ));
    assert!(matches!(PowerOceanError::mqtt("x"), PowerOceanError::Mqtt { .. }));
    assert!(matches!(
        PowerOceanError::decode("x"),
        PowerOceanError::Decode { .. }
    ));
    assert!(matches!(PowerOceanError::init("x"), PowerOceanError::Init { .. }));
    assert!(matches!(
        PowerOceanError::shutdown("x"),
        PowerOceanError::Shutdown { .. }
    ));
}

#[test]
fn api_error_keeps_code() {
    let err = PowerOceanError::api("8521", "signature is wrong");
    match &err {
        PowerOceanError::Api { code, message } => {
            assert_eq!(code, "8521");
            assert_eq!(message, "signature is wrong");
        }
        other => panic!("unexpected variant: {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "API error (code 8521): signature is wrong"
    );
    assert!(!err.is_transport());
}

#[test]
fn transport_classification() {
    assert!(PowerOceanError::network("reset").is_transport());
    assert!(PowerOceanError::timeout("slow").is_transport());
    assert!(!PowerOceanError::serialization("bad").is_transport());
}

#[test]
fn conversions_from_library_errors() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(PowerOceanError::from(io), PowerOceanError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        PowerOceanError::from(json),
        PowerOceanError::Serialization { .. }
    ));
}
