mod common;

use std::io::{Read, Write};

use common::{connect_over, drop_nth_shaper, identity_shaper};
use rudp::Profile;

#[test]
fn dropped_segment_is_retransmitted_and_still_delivered() {
    let profile = Profile::default();

    // Datagram #2 (0-indexed) in the client->server direction is the
    // first application DAT, right after the handshake's SYN and final
    // ACK; drop exactly that one copy and let the retransmission timer
    // resend it.
    let (server, mut client_conn) = connect_over(drop_nth_shaper(2), identity_shaper(), profile);
    let mut server_conn = server.accept().expect("accept");

    client_conn.write_all(b"resend me").unwrap();

    let mut buf = [0u8; 9];
    server_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"resend me");
}
