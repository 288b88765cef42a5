use std::io::{Read, Write};
use std::sync::Arc;

use rudp::{LoggingListener, Profile, Server};

fn main() {
    env_logger::init();

    let server = Server::bind("0.0.0.0:9090", 8, Profile::default()).expect("bind failed");
    server.add_listener(Arc::new(LoggingListener));

    println!(">>> Waiting for incoming connections on port {}...", server.get_local_port().unwrap());

    loop {
        let mut stream = match server.accept() {
            Ok(s) => s,
            Err(e) => {
                eprintln!(">>> accept failed: {e}");
                continue;
            }
        };
        println!(">>> Connection accepted from {}", stream.peer_addr());

        std::thread::spawn(move || loop {
            let mut buf = [0u8; 1500];
            let n = match stream.read(&mut buf[..]) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };

            if stream.write(&buf[..n]).is_err() {
                break;
            }

            println!(
                "\n>>> Read: {:?}\n",
                String::from_iter(buf[..n].iter().map(|c| *c as char))
            );
        });
    }
}
