use sockflow::{ChannelBuilder, FlowMeter};

#[test]
fn meter_tracks_buffered_bytes() {
    let flow = FlowMeter::new();
    let channel = ChannelBuilder::new()
        .with_flow_control(flow.clone())
        .build();

    channel.incoming_data(b"hello").unwrap();
    assert_eq!(flow.level(), 5);
    assert_eq!(channel.buffered_bytes(), 5);

    // Partial consume: three bytes processed, two still outstanding.
    let start = channel.consuming_start().unwrap();
    let mut dst = [0u8; 3];
    let (n, end) = channel.copy_buffered(start, &mut dst);
    assert_eq!(n, 3);
    assert_eq!(&dst, b"hel");
    channel.consuming_complete(end, end).unwrap();
    assert_eq!(flow.level(), 2);
    assert_eq!(channel.buffered_bytes(), 2);

    let mut dst = [0u8; 16];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 2);
    assert_eq!(&dst[..2], b"lo");
    assert_eq!(flow.level(), 0);
}

#[test]
fn meter_counts_across_block_boundaries() {
    let flow = FlowMeter::new();
    let pool = sockflow::SlabPool::with_block_size(4);
    let channel = ChannelBuilder::new()
        .with_pool(pool)
        .with_flow_control(flow.clone())
        .build();

    channel.incoming_data(b"abcdefghij").unwrap();
    assert_eq!(flow.level(), 10);

    let mut dst = [0u8; 7];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 7);
    assert_eq!(flow.level(), 3);

    let mut dst = [0u8; 16];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 3);
    assert_eq!(flow.level(), 0);
}

#[test]
fn meter_never_exceeds_buffered_and_never_goes_negative() {
    let flow = FlowMeter::new();
    let channel = ChannelBuilder::new()
        .with_flow_control(flow.clone())
        .build();

    for round in 0..50 {
        let chunk = vec![round as u8; 1 + fastrand::usize(..512)];
        channel.incoming_data(&chunk).unwrap();
        assert!(flow.level() <= channel.buffered_bytes() + chunk.len());
        assert_eq!(flow.level(), channel.buffered_bytes());

        let mut dst = vec![0u8; 1 + fastrand::usize(..768)];
        let start = channel.consuming_start().unwrap();
        let (_, end) = channel.copy_buffered(start, &mut dst);
        channel.consuming_complete(end, end).unwrap();
        assert_eq!(flow.level(), channel.buffered_bytes());
    }
}

#[test]
fn cancelled_reservation_never_touches_the_meter() {
    let flow = FlowMeter::new();
    let channel = ChannelBuilder::new()
        .with_flow_control(flow.clone())
        .build();

    let mut reservation = channel.incoming_start().unwrap();
    reservation.spare_mut()[..4].copy_from_slice(b"gone");
    channel.incoming_deferred(reservation);
    assert_eq!(flow.level(), 0);
    assert_eq!(channel.buffered_bytes(), 0);
}

#[test]
fn without_a_hook_no_accounting_happens() {
    // Just exercises the no-flow path end to end.
    let channel = ChannelBuilder::new().build();
    channel.incoming_data(b"data").unwrap();
    let mut dst = [0u8; 8];
    assert_eq!(channel.read_blocking(&mut dst).unwrap(), 4);
}
