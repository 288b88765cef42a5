mod common;

use std::io::{Read, Write};

use common::{connect_over, identity_shaper};
use rudp::Profile;

#[test]
fn handshake_establishes_and_carries_data_both_ways() {
    let (server, mut client_conn) = connect_over(identity_shaper(), identity_shaper(), Profile::default());
    let mut server_conn = server.accept().expect("accept");

    client_conn.write_all(b"ping").unwrap();
    let mut buf = [0u8; 4];
    server_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    server_conn.write_all(b"pong").unwrap();
    let mut buf = [0u8; 4];
    client_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");
}
