use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use sockflow::ChannelBuilder;

fn main() -> std::io::Result<()> {
    let channel = Arc::new(ChannelBuilder::new().build());

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || {
            for i in 0..3 {
                let line = format!("async message {}\n", i);
                channel.incoming_data(line.as_bytes()).unwrap();
                thread::sleep(Duration::from_millis(300));
            }
            channel.incoming_fin().unwrap();
        })
    };

    block_on(async {
        let mut buf = [0u8; 4096];
        loop {
            let n = channel.read(&mut buf).await?;
            if n == 0 {
                println!("End of stream");
                break;
            }
            print!("Received: {}", String::from_utf8_lossy(&buf[..n]));
        }
        Ok::<_, std::io::Error>(())
    })?;

    producer.join().unwrap();
    Ok(())
}
