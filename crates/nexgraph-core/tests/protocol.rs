mod common;

use common::{fast_config, init_tracing, MockGauge};
use nexgraph_core::export::{ChartPoint, Export, ExportError};
use nexgraph_core::protocol::{
    Command, ConnectionConfig, ConnectionState, ForceSession, ProtocolError, Reply, SessionMode,
    TorqueSession,
};
use pretty_assertions::assert_eq;

fn identified_gauge() -> MockGauge {
    MockGauge::new().reply(b'!', &["DFS-50 0.012 3\r\n"])
}

fn connected(gauge: &MockGauge) -> ForceSession {
    let mut session = ForceSession::new(fast_config());
    assert!(session.attach(gauge.clone()).unwrap());
    session
}

#[test]
fn test_handshake_identifies_gauge() {
    init_tracing();
    let gauge = identified_gauge();
    let session = connected(&gauge);

    assert_eq!(session.state(), ConnectionState::Identified);
    assert_eq!(session.session_mode(), SessionMode::Force);
    let identity = session.identity().unwrap();
    assert_eq!(identity.raw, "DFS-50 0.012 3");
    assert_eq!(identity.model_token, "DFS-50");
    assert_eq!(identity.offset, "0.012");
    assert_eq!(identity.overload_counter, "3");
    assert_eq!(gauge.written(), b"!".to_vec());
}

#[test]
fn test_handshake_any_two_tokens() {
    let gauge = MockGauge::new().reply(b'!', &["ACME 1\r\n"]);
    let mut session = ForceSession::new(fast_config());
    assert!(session.attach(gauge).unwrap());
    assert_eq!(session.identity().unwrap().model_token, "ACME");
}

#[test]
fn test_handshake_one_token_fails() {
    let gauge = MockGauge::new().reply(b'!', &["DFS-50\r\n"]);
    let mut session = ForceSession::new(fast_config());

    assert!(!session.attach(gauge.clone()).unwrap());
    assert!(session.identity().is_none());
    // Port stays open for a retry or an explicit disconnect
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(session.is_connected());
    assert!(!gauge.is_closed());

    session.disconnect().unwrap();
    assert!(gauge.is_closed());
}

#[test]
fn test_handshake_silent_gauge_fails() {
    let gauge = MockGauge::new();
    let mut session = ForceSession::new(fast_config());
    assert!(!session.attach(gauge).unwrap());
    assert!(session.identity().is_none());
}

#[test]
fn test_handshake_reads_only_first_line() {
    let gauge = MockGauge::new().reply(b'!', &["DFT-20 0.5 0\r\nsecond line\r\n"]);
    let mut session = ForceSession::new(fast_config());
    assert!(session.attach(gauge).unwrap());
    assert_eq!(session.identity().unwrap().raw, "DFT-20 0.5 0");
}

#[test]
fn test_handshake_line_split_across_chunks() {
    for chunks in [&["DFS-50 ", "0.012 3\r\n"][..], &["DF", "S-50 0.012 3\r\n"][..]] {
        let gauge = MockGauge::new().reply(b'!', chunks);
        let mut session = ForceSession::new(fast_config());
        assert!(session.attach(gauge).unwrap(), "chunks {:?}", chunks);
        assert_eq!(session.identity().unwrap().raw, "DFS-50 0.012 3");
        assert_eq!(session.get_counters().1, 16);
    }
}

#[test]
fn test_handshake_leaves_nothing_for_next_reply() {
    let gauge = MockGauge::new()
        .reply(b'!', &["DFS-50 0.012 3", "\r\n"])
        .reply(b'p', &["12.5 N\r\n"]);
    let mut session = connected(&gauge);
    assert_eq!(session.identity().unwrap().offset, "0.012");
    assert_eq!(session.print_value().unwrap().text(), "12.5 N\r\n");
}

#[test]
fn test_handshake_discards_trailing_chunks() {
    let gauge = MockGauge::new()
        .reply(b'!', &["DFT-20 0.5 0\r\nsec", "ond line\r\n", "third\r\n"])
        .reply(b'p', &["-1.0 N\r\n"]);
    let mut session = connected(&gauge);
    assert_eq!(session.identity().unwrap().raw, "DFT-20 0.5 0");
    assert_eq!(gauge.pending_chunks(), 0);
    assert_eq!(session.print_value().unwrap().text(), "-1.0 N\r\n");
}

#[test]
fn test_handshake_unterminated_line_at_timeout() {
    let gauge = MockGauge::new().reply(b'!', &["ACME 1"]);
    let mut session = ForceSession::new(fast_config());
    assert!(session.attach(gauge).unwrap());
    assert_eq!(session.identity().unwrap().raw, "ACME 1");
}

#[test]
fn test_handshake_strict_model_prefix() {
    let config = ConnectionConfig {
        require_model_prefix: true,
        ..fast_config()
    };

    let mut session = ForceSession::new(config.clone());
    let gauge = MockGauge::new().reply(b'!', &["ACME 1 0\r\n"]);
    assert!(!session.attach(gauge).unwrap());

    let mut session = ForceSession::new(config);
    assert!(session.attach(identified_gauge()).unwrap());
}

#[test]
fn test_handshake_write_failure_disconnects() {
    let gauge = identified_gauge();
    gauge.state.lock().unwrap().fail_writes = true;

    let mut session = ForceSession::new(fast_config());
    let err = session.attach(gauge.clone()).unwrap_err();
    assert!(err.is_transport());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(gauge.is_closed());
}

#[test]
fn test_attach_twice() {
    let gauge = identified_gauge();
    let mut session = connected(&gauge);
    assert!(matches!(
        session.attach(identified_gauge()),
        Err(ProtocolError::AlreadyConnected)
    ));
}

#[test]
fn test_query_aggregates_chunks() {
    let gauge = identified_gauge().reply(b'p', &["Peak T", "ension + 12", ".5 N\r\n"]);
    let mut session = connected(&gauge);

    let reply = session.peak_tension().unwrap();
    assert_eq!(reply, Reply::Data("Peak Tension + 12.5 N\r\n".to_string()));
    assert_eq!(gauge.written(), b"!p".to_vec());
}

#[test]
fn test_query_empty_reply() {
    let gauge = identified_gauge();
    let mut session = connected(&gauge);
    let reply = session.print_value().unwrap();
    assert!(reply.is_empty());
    assert_eq!(reply.text(), "");
}

#[test]
fn test_query_skips_undecodable_chunk() {
    let gauge = identified_gauge().reply_raw(
        b'l',
        vec![b"12.5 ".to_vec(), vec![0xFF, 0xFE], b"N\r\n".to_vec()],
    );
    let mut session = connected(&gauge);
    assert_eq!(session.long_output().unwrap().text(), "12.5 N\r\n");
}

#[test]
fn test_output_commands_use_their_bytes() {
    let gauge = identified_gauge()
        .reply(b'v', &["12.5\r\n"])
        .reply(b'L', &["12\r\n"])
        .reply(b'c', &["-3.0 N\r\n"]);
    let mut session = connected(&gauge);

    assert_eq!(session.short_output().unwrap().text(), "12.5\r\n");
    assert_eq!(session.mini_output().unwrap().text(), "12\r\n");
    assert_eq!(session.peak_compression().unwrap().text(), "-3.0 N\r\n");
    assert_eq!(gauge.written(), b"!vLc".to_vec());
}

#[test]
fn test_fire_and_forget_commands() {
    let gauge = identified_gauge();
    let mut session = connected(&gauge);

    session.zero().unwrap();
    session.reset().unwrap();
    session.toggle_unit().unwrap();
    session.toggle_mode().unwrap();

    assert_eq!(gauge.written(), b"!zrum".to_vec());
    assert_eq!(session.get_counters().0, 5);
}

#[test]
fn test_send_command_not_connected() {
    let mut session = ForceSession::new(fast_config());
    assert!(matches!(
        session.send_command(Command::Zero),
        Err(ProtocolError::NotConnected)
    ));
    assert!(matches!(
        session.query(Command::Print),
        Err(ProtocolError::NotConnected)
    ));
}

#[test]
fn test_torque_mode_rejects_every_command() {
    let gauge = MockGauge::new();
    let mut session = TorqueSession::new(fast_config());
    assert!(session.attach(gauge.clone()).unwrap());
    assert_eq!(session.state(), ConnectionState::Active);

    for command in Command::ALL {
        assert!(matches!(
            session.send_command(command),
            Err(ProtocolError::ModeMismatch {
                mode: SessionMode::Torque,
                ..
            })
        ));
        assert!(matches!(
            session.query(command),
            Err(ProtocolError::ModeMismatch { .. })
        ));
    }
    assert_eq!(gauge.write_calls(), 0);
}

#[test]
fn test_torque_attach_skips_handshake() {
    let gauge = identified_gauge();
    let mut session = TorqueSession::new(fast_config());
    assert!(session.attach(gauge.clone()).unwrap());
    assert_eq!(gauge.write_calls(), 0);
}

#[test]
fn test_disconnect() {
    let gauge = identified_gauge();
    let mut session = connected(&gauge);

    session.disconnect().unwrap();
    assert!(gauge.is_closed());
    assert!(session.identity().is_none());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        session.disconnect(),
        Err(ProtocolError::NotConnected)
    ));
}

#[test]
fn test_download_formats() {
    let dump = "001 T 12/03 10.5 N\r\n002 C 12/03 -3.25 N\r\n";
    let gauge = identified_gauge().reply(b'd', &[dump]);
    let mut session = connected(&gauge);

    let raw = session.download("raw").unwrap();
    assert_eq!(raw, Export::Text(dump.to_string()));

    let csv = session.download("delimited").unwrap();
    assert_eq!(
        csv.as_text(),
        Some("001,T,12/03,10.5,N\n002,C,12/03,-3.25,N\n")
    );

    let series = session.download("chart-series").unwrap();
    assert_eq!(
        series.as_series().unwrap(),
        &[ChartPoint::new("001", 10.5), ChartPoint::new("002", -3.25)]
    );
}

#[test]
fn test_download_unsupported_format_writes_nothing() {
    let gauge = identified_gauge().reply(b'd', &["A B C 1\r\n"]);
    let mut session = connected(&gauge);
    let writes_before = gauge.write_calls();

    for bad in ["xml", "", "bar-chart", "RAWS"] {
        let err = session.download(bad).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Export(ExportError::UnsupportedFormat(_))
        ));
    }
    assert_eq!(gauge.write_calls(), writes_before);
}

#[test]
fn test_download_chart_parse_error() {
    let gauge = identified_gauge().reply(b'd', &["A B C 3.5\r\nA B C xyz\r\n"]);
    let mut session = connected(&gauge);

    let err = session.download("chart-series").unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Export(ExportError::Parse { line: 2, .. })
    ));
}

#[test]
fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gauge.json");
    std::fs::write(
        &path,
        r#"{"port_name": "/dev/ttyUSB1", "baud": "slow", "require_model_prefix": true}"#,
    )
    .unwrap();

    let config = ConnectionConfig::from_json_file(&path).unwrap();
    assert_eq!(config.port_name, "/dev/ttyUSB1");
    assert_eq!(config.baud.baud_rate(), 9600);
    assert!(config.require_model_prefix);
    assert_eq!(config.model_prefixes, vec!["DFS", "DFT"]);
}

#[test]
fn test_config_from_json_file_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = ConnectionConfig::from_json_file(dir.path().join("missing.json"));
    assert!(matches!(missing, Err(ProtocolError::Configuration(_))));

    let path = dir.path().join("empty_port.json");
    std::fs::write(&path, r#"{"port_name": ""}"#).unwrap();
    assert!(matches!(
        ConnectionConfig::from_json_file(&path),
        Err(ProtocolError::Configuration(_))
    ));
}
