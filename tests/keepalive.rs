mod common;

use std::io::{Read, Write};
use std::time::Duration;

use common::{connect_over, identity_shaper};
use rudp::profile::ProfileBuilder;

/// With no application data flowing, the engine must still exchange NUL
/// keepalives and cumulative ACKs often enough that an idle connection
/// never trips its own retransmission limit.
#[test]
fn idle_connection_survives_past_several_null_segment_intervals() {
    let profile = ProfileBuilder::default()
        .null_segment_timeout(30)
        .retransmission_timeout(100)
        .cumulative_ack_timeout(100)
        .max_cumulative_acks(1)
        .max_retrans(2)
        .build()
        .unwrap();

    let (server, mut client_conn) = connect_over(identity_shaper(), identity_shaper(), profile);
    let mut server_conn = server.accept().expect("accept");

    std::thread::sleep(Duration::from_millis(400));

    assert!(!client_conn.is_closed());
    assert!(!server_conn.is_closed());

    client_conn.write_all(b"still alive").unwrap();
    let mut buf = [0u8; 11];
    server_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still alive");
}
