mod common;

use std::io::{Read, Write};

use common::{connect_over, identity_shaper, reorder_once_after_shaper};
use rudp::Profile;

#[test]
fn reordered_segments_are_reassembled_in_order() {
    let mut profile = Profile::default();
    profile.max_out_of_sequence = 1;

    // The handshake sends two client -> server datagrams (SYN, then the
    // final ACK) before any application data; skip those so only the
    // data segments get reordered.
    let (server, mut client_conn) =
        connect_over(reorder_once_after_shaper(2), identity_shaper(), profile);
    let mut server_conn = server.accept().expect("accept");

    client_conn.write_all(b"AA").unwrap();
    client_conn.write_all(b"BB").unwrap();

    let mut buf = [0u8; 4];
    server_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"AABB");
}
