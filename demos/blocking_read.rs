use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sockflow::{ChannelBuilder, FlowMeter};

fn main() -> std::io::Result<()> {
    let flow = FlowMeter::new();
    let channel = Arc::new(
        ChannelBuilder::new()
            .with_flow_control(flow.clone())
            .build(),
    );

    println!("Blocking reader: waiting for data...");

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || {
            for i in 0..5 {
                let line = format!("message {}\n", i);
                channel.incoming_data(line.as_bytes()).unwrap();
                thread::sleep(Duration::from_millis(200));
            }
            // Commit path: write straight into a pinned block.
            let mut reservation = channel.incoming_start().unwrap();
            let tail = b"direct write\n";
            reservation.spare_mut()[..tail.len()].copy_from_slice(tail);
            channel.incoming_complete(reservation, tail.len(), None).unwrap();

            channel.incoming_fin().unwrap();
        })
    };

    let mut buf = [0u8; 4096];
    loop {
        let n = channel.read_blocking(&mut buf)?;
        if n == 0 {
            println!("End of stream (outstanding bytes: {})", flow.level());
            break;
        }
        print!("Received: {}", String::from_utf8_lossy(&buf[..n]));
    }

    producer.join().unwrap();
    Ok(())
}
