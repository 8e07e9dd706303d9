use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sockflow::{ChannelBuilder, SlabPool};

#[test]
fn request_line_then_blocks_until_fin() {
    let channel = Arc::new(ChannelBuilder::new().build());

    let payload = b"GET / HTTP/1.1\r\n\r\n";
    let mut reservation = channel.incoming_start().unwrap();
    reservation.spare_mut()[..payload.len()].copy_from_slice(payload);
    channel
        .incoming_complete(reservation, payload.len(), None)
        .unwrap();

    let mut dst = [0u8; 4096];
    let n = channel.read_blocking(&mut dst).unwrap();
    assert_eq!(n, payload.len());
    assert_eq!(&dst[..n], payload);

    // Next read must block until the stream ends.
    let reader = {
        let channel = channel.clone();
        thread::spawn(move || {
            let mut dst = [0u8; 64];
            channel.read_blocking(&mut dst).unwrap()
        })
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!reader.is_finished());

    channel.incoming_fin().unwrap();
    assert_eq!(reader.join().unwrap(), 0);
}

#[test]
fn split_deliveries_cross_block_boundary() {
    // Tiny blocks force "abc" + "defgh" to span several blocks.
    let pool = SlabPool::with_block_size(4);
    let channel = ChannelBuilder::new().with_pool(pool).build();

    channel.incoming_data(b"abc").unwrap();
    channel.incoming_data(b"defgh").unwrap();

    let mut dst = [0u8; 10];
    let n = channel.read_blocking(&mut dst).unwrap();
    assert_eq!(n, 8);
    assert_eq!(&dst[..8], b"abcdefgh");
}

#[test]
fn zero_length_delivery_is_sticky_end_of_stream() {
    let channel = ChannelBuilder::new().build();
    channel.incoming_data(b"hi").unwrap();
    channel.incoming_fin().unwrap();

    let mut dst = [0u8; 16];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 2);
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 0);
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 0);
}

#[test]
fn fin_before_any_data() {
    let channel = ChannelBuilder::new().build();
    channel.incoming_fin().unwrap();
    let mut dst = [0u8; 16];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 0);
}

#[test]
fn small_reads_drain_one_large_delivery_in_order() {
    let channel = ChannelBuilder::new().build();
    channel.incoming_data(b"abcdefghij").unwrap();
    channel.incoming_fin().unwrap();

    let mut out = Vec::new();
    let mut dst = [0u8; 3];
    loop {
        let n = channel.read_blocking(&mut dst).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&dst[..n]);
    }
    assert_eq!(out, b"abcdefghij");
}

#[test]
fn randomized_chunks_round_trip_fifo() {
    let total = 256 * 1024;
    let mut expected = vec![0u8; total];
    for (i, byte) in expected.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }

    let channel = Arc::new(ChannelBuilder::new().build());
    let producer = {
        let channel = channel.clone();
        let data = expected.clone();
        thread::spawn(move || {
            let mut sent = 0;
            while sent < data.len() {
                let chunk = 1 + fastrand::usize(..2048);
                let chunk = chunk.min(data.len() - sent);
                if fastrand::bool() {
                    channel.incoming_data(&data[sent..sent + chunk]).unwrap();
                    sent += chunk;
                } else {
                    let mut reservation = channel.incoming_start().unwrap();
                    let take = chunk.min(reservation.spare_capacity());
                    reservation.spare_mut()[..take]
                        .copy_from_slice(&data[sent..sent + take]);
                    channel.incoming_complete(reservation, take, None).unwrap();
                    sent += take;
                }
            }
            channel.incoming_fin().unwrap();
        })
    };

    let mut received = Vec::with_capacity(total);
    let mut dst = [0u8; 1500];
    loop {
        let n = channel.read_blocking(&mut dst).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&dst[..n]);
    }
    producer.join().unwrap();

    assert_eq!(received.len(), expected.len());
    assert_eq!(received, expected);
}

#[test]
fn reservation_reuses_tail_spare_capacity() {
    let pool = SlabPool::new();
    let channel = ChannelBuilder::new().with_pool(pool.clone()).build();

    let mut first = channel.incoming_start().unwrap();
    first.spare_mut()[..3].copy_from_slice(b"foo");
    channel.incoming_complete(first, 3, None).unwrap();
    assert_eq!(pool.leased_blocks(), 1);

    // Plenty of spare room left; the second reservation pins the same tail.
    let mut second = channel.incoming_start().unwrap();
    second.spare_mut()[..3].copy_from_slice(b"bar");
    channel.incoming_complete(second, 3, None).unwrap();
    assert_eq!(pool.leased_blocks(), 1);

    let mut dst = [0u8; 16];
    let n = channel.read_blocking(&mut dst).unwrap();
    assert_eq!(&dst[..n], b"foobar");
}
