mod common;

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use common::{connect_over, identity_shaper};
use rudp::Profile;

#[test]
fn close_drains_pending_data_then_signals_eof() {
    let (server, mut client_conn) = connect_over(identity_shaper(), identity_shaper(), Profile::default());
    let mut server_conn = server.accept().expect("accept");

    client_conn.write_all(b"last words").unwrap();
    client_conn.close();

    let mut buf = [0u8; 10];
    server_conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"last words");

    let mut trailing = [0u8; 1];
    let n = server_conn.read(&mut trailing).unwrap();
    assert_eq!(n, 0, "peer closed its write side, read should report EOF");

    // The peer's FIN only shuts down our read direction; the server must
    // still close its own output side before the connection fully closes.
    server_conn.close();

    client_conn.wait_closed();
    assert!(client_conn.is_closed());

    let deadline = Instant::now() + Duration::from_secs(2);
    while !server_conn.is_closed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(server_conn.is_closed());
}
