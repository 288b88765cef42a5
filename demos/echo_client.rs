use std::io::{Read, Write};

use rudp::{Client, Profile};

fn main() {
    env_logger::init();

    println!(">>> Trying to connect to server...");
    let mut stream = Client::connect("127.0.0.1:9090", Profile::default()).expect("connect failed");
    println!(">>> Connected!");

    stream.write_all(b"hello over rudp").expect("write failed");

    let mut buf = [0u8; 1500];
    let n = stream.read(&mut buf[..]).expect("read failed");
    println!(
        "\n>>> Read: {:?}\n",
        String::from_iter(buf[..n].iter().map(|c| *c as char))
    );

    stream.close();
    stream.wait_closed();
}
